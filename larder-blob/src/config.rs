use std::collections::HashMap;

use larder_core::LarderConfigSnapshot;

use crate::SlotKind;

/// Configuration for asset operations
#[derive(Debug, Clone)]
pub struct AssetConfig {
    /// Per-slot size ceilings that replace the slot policy default.
    pub max_bytes_overrides: HashMap<SlotKind, u64>,

    /// Folder the remote image store files profile photos under.
    pub remote_folder: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            max_bytes_overrides: HashMap::new(),
            remote_folder: "food-blog/profile".to_string(),
        }
    }
}

impl AssetConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `limits.<slot>.max_bytes` and `cloudinary.folder`. A limit that
    /// is set but not a byte count is an error.
    pub fn from_snapshot(snapshot: &LarderConfigSnapshot) -> anyhow::Result<Self> {
        let mut config = Self::default();
        for kind in SlotKind::ALL {
            let key = format!("limits.{}.max_bytes", kind.config_key());
            if let Some(max) = snapshot.get_u64(&key)? {
                config.max_bytes_overrides.insert(kind, max);
            }
        }
        if let Some(folder) = snapshot.get_string("cloudinary.folder") {
            config.remote_folder = folder;
        }
        Ok(config)
    }

    /// Override one slot's size ceiling
    pub fn with_max_bytes(mut self, slot: SlotKind, bytes: u64) -> Self {
        self.max_bytes_overrides.insert(slot, bytes);
        self
    }

    /// Set the remote folder
    pub fn with_remote_folder<S: Into<String>>(mut self, folder: S) -> Self {
        self.remote_folder = folder.into();
        self
    }

    /// Effective ceiling for a slot
    pub fn max_bytes(&self, slot: SlotKind) -> u64 {
        self.max_bytes_overrides
            .get(&slot)
            .copied()
            .unwrap_or_else(|| slot.policy().max_bytes)
    }

    /// The largest ceiling across all slots; sizes the HTTP body limit.
    pub fn largest_max_bytes(&self) -> u64 {
        SlotKind::ALL
            .into_iter()
            .map(|slot| self.max_bytes(slot))
            .max()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::LarderConfig;

    #[test]
    fn snapshot_overrides_one_slot() {
        let mut raw = LarderConfig::new();
        raw.set("limits.hero_background.max_bytes", "1024");
        raw.set("cloudinary.folder", "blog/me");
        let config = AssetConfig::from_snapshot(&raw.snapshot()).unwrap();

        assert_eq!(config.max_bytes(SlotKind::HeroBackground), 1024);
        assert_eq!(config.max_bytes(SlotKind::Logo), SlotKind::Logo.policy().max_bytes);
        assert_eq!(config.remote_folder, "blog/me");
    }

    #[test]
    fn unparseable_limit_is_rejected() {
        let mut raw = LarderConfig::new();
        raw.set("limits.cv.max_bytes", "10MB");

        let err = AssetConfig::from_snapshot(&raw.snapshot()).unwrap_err();
        assert!(err.to_string().contains("limits.cv.max_bytes"));
    }

    #[test]
    fn largest_ceiling_tracks_overrides() {
        let config = AssetConfig::new().with_max_bytes(SlotKind::Favicon, 64 * 1024 * 1024);
        assert_eq!(config.largest_max_bytes(), 64 * 1024 * 1024);
    }
}
