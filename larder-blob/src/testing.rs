//! In-process doubles for the stores, for tests in this and dependent crates.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;

use crate::remote::{RemoteImageStore, UploadOptions};
use crate::store::{DiskStore, LocalDiskStore, OpenedFile};
use crate::registry::{MemorySlotRegistry, SiteAssets, SlotRegistry};
use crate::{AssetError, AssetLocator, AssetResult, RemoteAsset, SlotKind, StoreKind, StoredFile};

/// Remote image store that keeps assets in memory and records every call.
#[derive(Debug, Default)]
pub struct RecordingImageStore {
    uploads: Mutex<Vec<UploadOptions>>,
    existing: Mutex<BTreeSet<String>>,
    destroyed: Mutex<Vec<String>>,
    counter: AtomicUsize,
    fail_next_upload: AtomicBool,
    fail_destroy: AtomicBool,
    source_size: Mutex<Option<(u32, u32)>>,
}

impl RecordingImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `upload` fail as if the service were unreachable.
    pub fn fail_next_upload(&self) {
        self.fail_next_upload.store(true, Ordering::SeqCst);
    }

    /// Make every `destroy` fail.
    pub fn fail_destroys(&self, fail: bool) {
        self.fail_destroy.store(fail, Ordering::SeqCst);
    }

    /// Pretend uploaded images have these source dimensions.
    pub fn set_source_size(&self, width: u32, height: u32) {
        *lock(&self.source_size) = Some((width, height));
    }

    /// Options passed to every upload so far.
    pub fn recorded_uploads(&self) -> Vec<UploadOptions> {
        lock(&self.uploads).clone()
    }

    pub fn destroyed(&self) -> Vec<String> {
        lock(&self.destroyed).clone()
    }

    pub fn exists(&self, public_id: &str) -> bool {
        lock(&self.existing).contains(public_id)
    }

    pub fn live_count(&self) -> usize {
        lock(&self.existing).len()
    }
}

#[async_trait]
impl RemoteImageStore for RecordingImageStore {
    async fn upload(
        &self,
        bytes: Bytes,
        _file_name: Option<&str>,
        options: &UploadOptions,
    ) -> AssetResult<RemoteAsset> {
        lock(&self.uploads).push(options.clone());

        if self.fail_next_upload.swap(false, Ordering::SeqCst) {
            return Err(AssetError::storage(
                StoreKind::RemoteImage,
                "uploading image",
                "connection refused",
            ));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let public_id = format!("{}/asset-{n}", options.folder);
        let source = *lock(&self.source_size);
        let (width, height) = source
            .map(|(w, h)| options.profile.effective_size(w, h))
            .unzip();

        lock(&self.existing).insert(public_id.clone());
        Ok(RemoteAsset {
            secure_url: format!("https://res.example.test/image/upload/v1/{public_id}.jpg"),
            public_id,
            width,
            height,
            bytes: Some(bytes.len() as u64),
        })
    }

    async fn destroy(&self, public_id: &str) -> AssetResult<()> {
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(AssetError::storage(
                StoreKind::RemoteImage,
                "destroying image",
                "service unavailable",
            ));
        }
        lock(&self.existing).remove(public_id);
        lock(&self.destroyed).push(public_id.to_string());
        Ok(())
    }
}

/// Local disk store that counts every filesystem access.
#[derive(Debug)]
pub struct SpyDiskStore {
    inner: LocalDiskStore,
    opens: AtomicUsize,
    writes: AtomicUsize,
    removes: AtomicUsize,
    fail_writes: AtomicBool,
    fail_removes: AtomicBool,
}

impl SpyDiskStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::wrap(LocalDiskStore::new(root.as_ref()))
    }

    pub fn wrap(inner: LocalDiskStore) -> Self {
        Self {
            inner,
            opens: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &LocalDiskStore {
        &self.inner
    }

    /// Make every `write` fail as if the disk were full.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every `remove` fail with a permission error.
    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    /// Total filesystem touches of any kind.
    pub fn accesses(&self) -> usize {
        self.opens() + self.writes() + self.removes()
    }
}

#[async_trait]
impl DiskStore for SpyDiskStore {
    async fn write(
        &self,
        slot: SlotKind,
        bytes: Bytes,
        extension: Option<&str>,
    ) -> AssetResult<StoredFile> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AssetError::local(
                format!("writing {slot}"),
                std::io::Error::new(std::io::ErrorKind::StorageFull, "no space left on device"),
            ));
        }
        self.inner.write(slot, bytes, extension).await
    }

    async fn open(&self, relative_path: &str) -> AssetResult<Option<OpenedFile>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open(relative_path).await
    }

    async fn remove(&self, relative_path: &str) -> AssetResult<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(AssetError::local(
                format!("deleting {relative_path}"),
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only filesystem"),
            ));
        }
        self.inner.remove(relative_path).await
    }

    async fn list(&self) -> AssetResult<Vec<String>> {
        self.inner.list().await
    }
}

/// In-memory registry whose reads and writes can be made to fail or stall.
#[derive(Debug, Default)]
pub struct ScriptedRegistry {
    inner: MemorySlotRegistry,
    fail_gets: AtomicBool,
    fail_sets: AtomicBool,
    hold_gets: AtomicBool,
    get_entered: Notify,
    released: Notify,
}

impl ScriptedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sets(&self, fail: bool) {
        self.fail_sets.store(fail, Ordering::SeqCst);
    }

    /// Park the next `get` until [`release_gets`](Self::release_gets).
    pub fn hold_gets(&self) {
        self.hold_gets.store(true, Ordering::SeqCst);
    }

    pub fn release_gets(&self) {
        self.hold_gets.store(false, Ordering::SeqCst);
        self.released.notify_one();
    }

    /// Resolves once a held `get` has been entered.
    pub async fn get_entered(&self) {
        self.get_entered.notified().await;
    }

    fn unavailable(context: &str) -> AssetError {
        AssetError::registry(context, std::io::Error::other("registry unavailable"))
    }
}

#[async_trait]
impl SlotRegistry for ScriptedRegistry {
    async fn get(&self, slot: SlotKind) -> AssetResult<Option<AssetLocator>> {
        if self.hold_gets.load(Ordering::SeqCst) {
            self.get_entered.notify_one();
            self.released.notified().await;
        }
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(Self::unavailable("reading slot"));
        }
        self.inner.get(slot).await
    }

    async fn set(&self, slot: SlotKind, locator: AssetLocator) -> AssetResult<Option<AssetLocator>> {
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(Self::unavailable("writing slot"));
        }
        self.inner.set(slot, locator).await
    }

    async fn clear(&self, slot: SlotKind) -> AssetResult<Option<AssetLocator>> {
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(Self::unavailable("clearing slot"));
        }
        self.inner.clear(slot).await
    }

    async fn snapshot(&self) -> AssetResult<SiteAssets> {
        self.inner.snapshot().await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
