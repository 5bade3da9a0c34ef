use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument, warn, Instrument};

use crate::registry::SiteAssets;
use crate::remote::{TransformProfile, UploadOptions};
use crate::slot::Backend;
use crate::{
    AssetConfig, AssetError, AssetHandle, AssetLocator, AssetResult, DiskStore, RemoteImageStore,
    SlotKind, SlotLocks, SlotRegistry, UploadRequest, ValidationReason,
};

/// Where an upload is in its lifecycle. Recorded on log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Received,
    Validated,
    Stored,
    PreviousResolved,
    PreviousCleaned,
    RegistryUpdated,
}

impl UploadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStage::Received => "received",
            UploadStage::Validated => "validated",
            UploadStage::Stored => "stored",
            UploadStage::PreviousResolved => "previous_resolved",
            UploadStage::PreviousCleaned => "previous_cleaned",
            UploadStage::RegistryUpdated => "registry_updated",
        }
    }
}

/// Orchestrates validation, backend selection, storage, cleanup of the
/// previous asset and the registry commit for every slot.
///
/// Holds no per-call state; everything it knows between calls lives in the
/// registry and the stores.
#[derive(Clone)]
pub struct AssetCoordinator {
    registry: Arc<dyn SlotRegistry>,
    disk: Arc<dyn DiskStore>,
    remote: Arc<dyn RemoteImageStore>,
    config: Arc<AssetConfig>,
    locks: Arc<SlotLocks>,
}

impl AssetCoordinator {
    pub fn new(
        registry: Arc<dyn SlotRegistry>,
        disk: Arc<dyn DiskStore>,
        remote: Arc<dyn RemoteImageStore>,
        config: AssetConfig,
    ) -> Self {
        Self {
            registry,
            disk,
            remote,
            config: Arc::new(config),
            locks: Arc::new(SlotLocks::new()),
        }
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    pub fn disk(&self) -> &Arc<dyn DiskStore> {
        &self.disk
    }

    /// Reject a request before any side effect.
    pub fn validate(&self, request: &UploadRequest) -> AssetResult<()> {
        let slot = request.slot;
        let policy = slot.policy();

        if request.size_bytes == 0 {
            return Err(AssetError::validation(slot, ValidationReason::Empty));
        }

        if !policy.accepts(&request.mime_type) {
            return Err(AssetError::validation(
                slot,
                ValidationReason::UnsupportedType {
                    mime_type: request.mime_type.clone(),
                    allowed: policy.accept.iter().map(|s| s.to_string()).collect(),
                },
            ));
        }

        let max_bytes = self.config.max_bytes(slot);
        if request.size_bytes > max_bytes {
            return Err(AssetError::validation(
                slot,
                ValidationReason::TooLarge {
                    size_bytes: request.size_bytes,
                    max_bytes,
                },
            ));
        }

        Ok(())
    }

    /// Replace the asset in a slot.
    ///
    /// The new asset is fully stored before the previous one is touched.
    /// Cleanup of the previous asset and the registry commit then run in a
    /// detached task that keeps the slot lock, so dropping this future after
    /// the store step never leaves the registry half-updated.
    #[instrument(name = "asset.upload", skip_all, fields(slot = %request.slot, size = request.size_bytes))]
    pub async fn upload(&self, request: UploadRequest) -> AssetResult<AssetLocator> {
        let slot = request.slot;
        debug!(stage = UploadStage::Received.as_str(), mime = %request.mime_type);

        self.validate(&request)?;
        debug!(stage = UploadStage::Validated.as_str());

        let guard = self.locks.acquire(slot).await;

        let locator = self.store(&request).await?;
        debug!(stage = UploadStage::Stored.as_str(), handle = %locator.handle);

        let tail = CommitTail {
            slot,
            registry: self.registry.clone(),
            disk: self.disk.clone(),
            remote: self.remote.clone(),
        };
        let committed = locator.clone();
        let commit = tokio::spawn(
            async move { tail.run(committed, guard).await }.instrument(tracing::Span::current()),
        );

        match commit.await {
            Ok(Ok(())) => {
                info!(url = %locator.url, "slot updated");
                Ok(locator)
            }
            Ok(Err(e)) => Err(e),
            Err(join) => Err(AssetError::registry("committing slot", join)),
        }
    }

    async fn store(&self, request: &UploadRequest) -> AssetResult<AssetLocator> {
        let slot = request.slot;
        let locator = match slot.policy().backend {
            Backend::Remote => {
                let options =
                    UploadOptions::new(TransformProfile::profile_photo(), self.config.remote_folder.clone());
                let asset = self
                    .remote
                    .upload(request.bytes.clone(), request.original_name.as_deref(), &options)
                    .await?;
                let size = asset.bytes.unwrap_or(request.size_bytes);
                AssetLocator::new(
                    asset.secure_url,
                    AssetHandle::Remote {
                        public_id: asset.public_id,
                    },
                )
                .with_size(size)
            }
            Backend::Local(_) => {
                let extension = request.extension();
                let stored = self
                    .disk
                    .write(slot, request.bytes.clone(), extension.as_deref())
                    .await?;
                AssetLocator::new(
                    stored.url,
                    AssetHandle::Local {
                        path: stored.relative_path,
                    },
                )
                .with_size(stored.size_bytes)
            }
        };
        Ok(locator.with_content_type(request.mime_type.clone()))
    }

    /// Empty a slot and clean up what it held. Returns the removed locator.
    #[instrument(name = "asset.remove", skip_all, fields(slot = %slot))]
    pub async fn remove(&self, slot: SlotKind) -> AssetResult<Option<AssetLocator>> {
        let _guard = self.locks.acquire(slot).await;

        let previous = self.registry.clear(slot).await?;
        match &previous {
            Some(locator) => {
                cleanup(&*self.disk, &*self.remote, locator).await;
                info!(url = %locator.url, "slot cleared");
            }
            None => debug!("slot already empty"),
        }
        Ok(previous)
    }

    /// Current locator of a slot.
    pub async fn current(&self, slot: SlotKind) -> AssetResult<Option<AssetLocator>> {
        self.registry.get(slot).await
    }

    /// Every slot at once.
    pub async fn all(&self) -> AssetResult<SiteAssets> {
        self.registry.snapshot().await
    }

    /// Delete local files no slot refers to, returning their relative paths.
    ///
    /// Holds every slot lock, so a file stored by an in-flight upload but
    /// not yet committed is never swept.
    #[instrument(name = "asset.reclaim", skip_all)]
    pub async fn reclaim_orphans(&self) -> AssetResult<Vec<String>> {
        let _guards = self.locks.acquire_all().await;

        let assets = self.registry.snapshot().await?;
        let referenced: HashSet<&str> = assets
            .occupied()
            .filter_map(|(_, locator)| locator.local_path())
            .collect();

        let mut reclaimed = Vec::new();
        for path in self.disk.list().await? {
            if referenced.contains(path.as_str()) {
                continue;
            }
            match self.disk.remove(&path).await {
                Ok(()) => reclaimed.push(path),
                Err(e) => warn!(error = %AssetError::cleanup(path.as_str(), e), "could not reclaim orphan"),
            }
        }

        info!(count = reclaimed.len(), "reclaimed orphaned files");
        Ok(reclaimed)
    }
}

/// Everything after the store step, owned so it can run detached.
struct CommitTail {
    slot: SlotKind,
    registry: Arc<dyn SlotRegistry>,
    disk: Arc<dyn DiskStore>,
    remote: Arc<dyn RemoteImageStore>,
}

impl CommitTail {
    async fn run(self, locator: AssetLocator, _guard: OwnedMutexGuard<()>) -> AssetResult<()> {
        let previous = self.registry.get(self.slot).await.map_err(|e| {
            warn!(handle = %locator.handle, "new asset stored but not committed");
            e
        })?;
        debug!(stage = UploadStage::PreviousResolved.as_str(), previous = previous.is_some());

        if let Some(previous) = previous.as_ref().filter(|p| !p.same_asset(&locator)) {
            cleanup(&*self.disk, &*self.remote, previous).await;
        }
        debug!(stage = UploadStage::PreviousCleaned.as_str());

        let displaced = self
            .registry
            .set(self.slot, locator.clone())
            .await
            .map_err(|e| {
                warn!(handle = %locator.handle, "new asset stored but not committed");
                e
            })?;
        debug!(stage = UploadStage::RegistryUpdated.as_str());

        // Another writer outside this process changed the slot between the
        // read and the write.
        if let Some(displaced) = displaced {
            let known = displaced.same_asset(&locator)
                || previous.as_ref().is_some_and(|p| p.same_asset(&displaced));
            if !known {
                cleanup(&*self.disk, &*self.remote, &displaced).await;
            }
        }

        Ok(())
    }
}

/// Best-effort removal of the physical asset behind a locator.
async fn cleanup(disk: &dyn DiskStore, remote: &dyn RemoteImageStore, locator: &AssetLocator) {
    match &locator.handle {
        AssetHandle::Local { path } => disk.delete(path).await,
        AssetHandle::Remote { public_id } => remote.destroy_best_effort(public_id).await,
    }
}

impl std::fmt::Debug for AssetCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
