use std::pin::Pin;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};

use crate::slot::normalize_mime;
use crate::SlotKind;

/// Stream of bytes for asset content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Backend-specific handle needed to delete an asset later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "camelCase")]
pub enum AssetHandle {
    /// Path relative to the uploads directory, e.g. `public/logo`.
    Local { path: String },
    /// Identifier assigned by the remote image store at upload time.
    Remote {
        #[serde(rename = "publicId")]
        public_id: String,
    },
}

impl std::fmt::Display for AssetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetHandle::Local { path } => write!(f, "local:{path}"),
            AssetHandle::Remote { public_id } => write!(f, "remote:{public_id}"),
        }
    }
}

/// The current value of a slot: the URL clients use plus the handle
/// cleanup uses. Both are recorded together at upload time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetLocator {
    pub url: String,
    pub handle: AssetHandle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    pub stored_at: DateTime<Utc>,
}

impl AssetLocator {
    pub fn new(url: impl Into<String>, handle: AssetHandle) -> Self {
        Self {
            url: url.into(),
            handle,
            content_type: None,
            size_bytes: None,
            stored_at: Utc::now(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    /// Whether both locators point at the same physical asset.
    pub fn same_asset(&self, other: &AssetLocator) -> bool {
        self.handle == other.handle
    }

    pub fn local_path(&self) -> Option<&str> {
        match &self.handle {
            AssetHandle::Local { path } => Some(path),
            AssetHandle::Remote { .. } => None,
        }
    }
}

/// A file submitted for a slot. Never persisted.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub slot: SlotKind,
    pub bytes: Bytes,
    pub mime_type: String,
    pub size_bytes: u64,
    pub original_name: Option<String>,
}

impl UploadRequest {
    pub fn new(slot: SlotKind, mime_type: impl AsRef<str>, bytes: Bytes) -> Self {
        Self {
            slot,
            size_bytes: bytes.len() as u64,
            mime_type: normalize_mime(mime_type.as_ref()),
            bytes,
            original_name: None,
        }
    }

    pub fn with_original_name(mut self, name: impl Into<String>) -> Self {
        self.original_name = Some(name.into());
        self
    }

    /// File extension to keep on disk, chosen from the validated mime type
    /// first and the client's file name second.
    pub fn extension(&self) -> Option<String> {
        let from_mime = match self.mime_type.as_str() {
            "application/pdf" => Some("pdf"),
            "application/msword" => Some("doc"),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some("docx")
            }
            "image/jpeg" => Some("jpg"),
            "image/png" => Some("png"),
            "image/webp" => Some("webp"),
            "image/gif" => Some("gif"),
            "image/svg+xml" => Some("svg"),
            "image/x-icon" | "image/vnd.microsoft.icon" => Some("ico"),
            _ => None,
        };

        from_mime.map(str::to_string).or_else(|| {
            let name = self.original_name.as_deref()?;
            let (_, ext) = name.rsplit_once('.')?;
            let ext = ext.to_ascii_lowercase();
            let valid = !ext.is_empty()
                && ext.len() <= 8
                && ext.chars().all(|c| c.is_ascii_alphanumeric());
            valid.then_some(ext)
        })
    }
}

/// What the remote image store hands back after an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAsset {
    pub public_id: String,
    pub secure_url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub bytes: Option<u64>,
}

/// What the local disk store hands back after a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Path relative to the uploads directory.
    pub relative_path: String,
    pub file_name: String,
    pub url: String,
    pub size_bytes: u64,
}
