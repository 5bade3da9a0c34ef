//! # larder-blob: slot-based asset lifecycle
//!
//! A site has a handful of named asset slots (profile photo, CV, logo,
//! favicon, hero background). Each slot holds exactly one current asset.
//! `larder-blob` accepts uploads for those slots, stores the bytes in the
//! right backend, and swaps the slot over without ever leaving it pointing
//! at nothing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use larder_blob::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> AssetResult<()> {
//! let coordinator = AssetCoordinator::new(
//!     Arc::new(JsonFileRegistry::new("data/site-assets.json")),
//!     Arc::new(LocalDiskStore::new("uploads")),
//!     Arc::new(CloudinaryStore::new(CloudinaryCredentials::new("cloud", "key", "secret"))),
//!     AssetConfig::default(),
//! );
//!
//! let request = UploadRequest::new(SlotKind::Logo, "image/png", Bytes::from_static(b"\x89PNG"));
//! let locator = coordinator.upload(request).await?;
//! assert_eq!(locator.url, "/uploads/logo");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────┐
//! │   AssetCoordinator    │  ← validate, store, clean up, commit
//! ├───────────┬───────────┤
//! │ DiskStore │ RemoteImg │  ← physical bytes
//! ├───────────┴───────────┤
//! │     SlotRegistry      │  ← current locator per slot
//! └───────────────────────┘
//! ```
//!
//! Every upload walks `Received → Validated → Stored → PreviousResolved →
//! PreviousCleaned → RegistryUpdated`. A failure before `Stored` changes
//! nothing; cleanup failures are logged and never surface.

mod config;
mod coordinator;
mod error;
mod locks;
pub mod registry;
pub mod remote;
pub mod slot;
pub mod store;
mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::AssetConfig;
pub use coordinator::{AssetCoordinator, UploadStage};
pub use error::{AssetError, AssetResult, StoreKind, ValidationReason};
pub use locks::SlotLocks;
pub use registry::{JsonFileRegistry, MemorySlotRegistry, SiteAssets, SlotRegistry};
pub use remote::{
    CloudinaryCredentials, CloudinaryStore, RemoteImageStore, TransformProfile, UploadOptions,
};
pub use slot::{Backend, LocalPlacement, NamingPolicy, SlotKind, SlotPolicy, Visibility};
pub use store::{DiskStore, LocalDiskStore, OpenedFile};
pub use types::{
    AssetHandle, AssetLocator, ByteStream, RemoteAsset, StoredFile, UploadRequest,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AssetConfig, AssetCoordinator, AssetError, AssetLocator, AssetResult, CloudinaryCredentials,
        CloudinaryStore, DiskStore, JsonFileRegistry, LocalDiskStore, MemorySlotRegistry,
        RemoteImageStore, SlotKind, SlotRegistry, UploadRequest,
    };
}
