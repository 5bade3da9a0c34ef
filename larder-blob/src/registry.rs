use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::{AssetError, AssetLocator, AssetResult, SlotKind, StoreKind};

/// The single site-assets record: one locator per slot, nothing else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteAssets {
    #[serde(default)]
    pub profile_image: Option<AssetLocator>,
    #[serde(default)]
    pub cv: Option<AssetLocator>,
    #[serde(default)]
    pub logo: Option<AssetLocator>,
    #[serde(default)]
    pub favicon: Option<AssetLocator>,
    #[serde(default)]
    pub hero_background: Option<AssetLocator>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SiteAssets {
    pub fn slot(&self, kind: SlotKind) -> Option<&AssetLocator> {
        match kind {
            SlotKind::ProfileImage => self.profile_image.as_ref(),
            SlotKind::Cv => self.cv.as_ref(),
            SlotKind::Logo => self.logo.as_ref(),
            SlotKind::Favicon => self.favicon.as_ref(),
            SlotKind::HeroBackground => self.hero_background.as_ref(),
        }
    }

    fn slot_mut(&mut self, kind: SlotKind) -> &mut Option<AssetLocator> {
        match kind {
            SlotKind::ProfileImage => &mut self.profile_image,
            SlotKind::Cv => &mut self.cv,
            SlotKind::Logo => &mut self.logo,
            SlotKind::Favicon => &mut self.favicon,
            SlotKind::HeroBackground => &mut self.hero_background,
        }
    }

    /// Replace a slot's value, returning what was displaced.
    pub fn replace(&mut self, kind: SlotKind, value: Option<AssetLocator>) -> Option<AssetLocator> {
        self.updated_at = Some(Utc::now());
        std::mem::replace(self.slot_mut(kind), value)
    }

    /// `(slot, locator)` for every occupied slot.
    pub fn occupied(&self) -> impl Iterator<Item = (SlotKind, &AssetLocator)> {
        SlotKind::ALL
            .into_iter()
            .filter_map(move |kind| self.slot(kind).map(|loc| (kind, loc)))
    }
}

/// Persists the current locator per slot.
#[async_trait]
pub trait SlotRegistry: Send + Sync {
    async fn get(&self, slot: SlotKind) -> AssetResult<Option<AssetLocator>>;

    /// Store `locator`, returning the displaced value.
    async fn set(&self, slot: SlotKind, locator: AssetLocator) -> AssetResult<Option<AssetLocator>>;

    /// Empty the slot, returning the displaced value.
    async fn clear(&self, slot: SlotKind) -> AssetResult<Option<AssetLocator>>;

    /// The whole record.
    async fn snapshot(&self) -> AssetResult<SiteAssets>;
}

/// In-process registry
#[derive(Debug, Default)]
pub struct MemorySlotRegistry {
    assets: RwLock<SiteAssets>,
}

impl MemorySlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SlotRegistry for MemorySlotRegistry {
    async fn get(&self, slot: SlotKind) -> AssetResult<Option<AssetLocator>> {
        Ok(self.assets.read().await.slot(slot).cloned())
    }

    async fn set(&self, slot: SlotKind, locator: AssetLocator) -> AssetResult<Option<AssetLocator>> {
        Ok(self.assets.write().await.replace(slot, Some(locator)))
    }

    async fn clear(&self, slot: SlotKind) -> AssetResult<Option<AssetLocator>> {
        Ok(self.assets.write().await.replace(slot, None))
    }

    async fn snapshot(&self) -> AssetResult<SiteAssets> {
        Ok(self.assets.read().await.clone())
    }
}

/// Registry backed by one JSON document on disk.
///
/// There is no insert path: reads of a missing document yield the empty
/// record and the first write creates it, so at most one record exists.
pub struct JsonFileRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> AssetResult<SiteAssets> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|e| AssetError::corrupt(StoreKind::Registry, self.path.display().to_string(), e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SiteAssets::default()),
            Err(e) => Err(AssetError::registry(
                format!("reading {}", self.path.display()),
                e,
            )),
        }
    }

    async fn persist(&self, assets: &SiteAssets) -> AssetResult<()> {
        let context = || format!("writing {}", self.path.display());
        let raw = serde_json::to_vec_pretty(assets).map_err(|e| AssetError::registry(context(), e))?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| AssetError::registry(context(), e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| AssetError::registry(context(), e))?;
        file.write_all(&raw)
            .await
            .map_err(|e| AssetError::registry(context(), e))?;
        file.sync_all()
            .await
            .map_err(|e| AssetError::registry(context(), e))?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| AssetError::registry(context(), e))
    }

    /// Read-modify-write under the registry lock.
    async fn update<F>(&self, f: F) -> AssetResult<Option<AssetLocator>>
    where
        F: FnOnce(&mut SiteAssets) -> Option<AssetLocator> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut assets = self.load().await?;
        let displaced = f(&mut assets);
        self.persist(&assets).await?;
        Ok(displaced)
    }
}

#[async_trait]
impl SlotRegistry for JsonFileRegistry {
    async fn get(&self, slot: SlotKind) -> AssetResult<Option<AssetLocator>> {
        Ok(self.load().await?.slot(slot).cloned())
    }

    async fn set(&self, slot: SlotKind, locator: AssetLocator) -> AssetResult<Option<AssetLocator>> {
        self.update(move |assets| assets.replace(slot, Some(locator)))
            .await
    }

    async fn clear(&self, slot: SlotKind) -> AssetResult<Option<AssetLocator>> {
        self.update(move |assets| assets.replace(slot, None)).await
    }

    async fn snapshot(&self) -> AssetResult<SiteAssets> {
        self.load().await
    }
}
