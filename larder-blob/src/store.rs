use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::slot::{Backend, LocalPlacement, NamingPolicy, Visibility};
use crate::{AssetError, AssetResult, ByteStream, SlotKind, StoredFile};

/// An opened local file ready to stream
pub struct OpenedFile {
    pub stream: ByteStream,
    pub size_bytes: u64,
}

/// Filesystem operations the coordinator and the download gate need.
#[async_trait]
pub trait DiskStore: Send + Sync {
    /// Write a slot's bytes, replacing a fixed-name file atomically.
    async fn write(
        &self,
        slot: SlotKind,
        bytes: Bytes,
        extension: Option<&str>,
    ) -> AssetResult<StoredFile>;

    /// Open a file by relative path. `Ok(None)` when it does not exist.
    async fn open(&self, relative_path: &str) -> AssetResult<Option<OpenedFile>>;

    /// Remove a file. A missing file is success.
    async fn remove(&self, relative_path: &str) -> AssetResult<()>;

    /// Every file under the store, as relative paths.
    async fn list(&self) -> AssetResult<Vec<String>>;

    /// Best-effort removal: failures are logged, never returned.
    async fn delete(&self, relative_path: &str) {
        match self.remove(relative_path).await {
            Ok(()) => tracing::debug!(path = %relative_path, "deleted local asset"),
            Err(e) => {
                let cleanup = AssetError::cleanup(relative_path, e);
                tracing::warn!(error = %cleanup, "leaving orphaned local asset");
            }
        }
    }
}

/// Local filesystem store rooted at the uploads directory.
///
/// Layout:
///
/// ```text
/// uploads/
/// ├── public/            served under /uploads/
/// │   ├── logo
/// │   ├── favicon
/// │   └── hero-background
/// └── private/           served only through /download/
///     └── cv-1718035200123.pdf
/// ```
#[derive(Debug)]
pub struct LocalDiskStore {
    root: PathBuf,
    public_base_url: String,
    download_base_url: String,
    last_stamp: AtomicI64,
}

impl LocalDiskStore {
    /// The directory tree is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_base_url: "/uploads".to_string(),
            download_base_url: "/download".to_string(),
            last_stamp: AtomicI64::new(0),
        }
    }

    pub fn with_base_urls(
        mut self,
        public_base_url: impl Into<String>,
        download_base_url: impl Into<String>,
    ) -> Self {
        self.public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        self.download_base_url = download_base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Milliseconds since the epoch, strictly increasing across calls.
    fn next_stamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = self.last_stamp.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self.last_stamp.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }

    fn file_name_for(&self, naming: NamingPolicy, extension: Option<&str>) -> String {
        match naming {
            NamingPolicy::Fixed(name) => name.to_string(),
            NamingPolicy::Timestamped(prefix) => {
                let stamp = self.next_stamp();
                match extension {
                    Some(ext) => format!("{prefix}-{stamp}.{ext}"),
                    None => format!("{prefix}-{stamp}"),
                }
            }
        }
    }

    fn url_for(&self, visibility: Visibility, file_name: &str) -> String {
        match visibility {
            Visibility::Public => format!("{}/{}", self.public_base_url, file_name),
            Visibility::Private => format!("{}/{}", self.download_base_url, file_name),
        }
    }

    /// Join a relative path under the root, refusing anything that could
    /// step outside it.
    fn resolve(&self, relative_path: &str) -> AssetResult<PathBuf> {
        let rel = Path::new(relative_path);
        let clean = !relative_path.is_empty()
            && rel.components().all(|c| match c {
                Component::Normal(part) => !part.to_string_lossy().starts_with('.'),
                _ => false,
            });
        if !clean {
            return Err(AssetError::InvalidPath(relative_path.to_string()));
        }
        Ok(self.root.join(rel))
    }

    async fn write_atomically(&self, dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let dir = dest
            .parent()
            .ok_or_else(|| std::io::Error::other("destination has no parent directory"))?;
        tokio::fs::create_dir_all(dir).await?;

        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, dest).await
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }
}

#[async_trait]
impl DiskStore for LocalDiskStore {
    async fn write(
        &self,
        slot: SlotKind,
        bytes: Bytes,
        extension: Option<&str>,
    ) -> AssetResult<StoredFile> {
        let LocalPlacement { naming, visibility } = match slot.policy().backend {
            Backend::Local(placement) => placement,
            Backend::Remote => {
                return Err(AssetError::InvalidPath(format!(
                    "slot '{slot}' is not stored on local disk"
                )))
            }
        };

        let file_name = self.file_name_for(naming, extension);
        let relative_path = format!("{}/{}", visibility.dir(), file_name);
        let dest = self.resolve(&relative_path)?;

        self.write_atomically(&dest, &bytes)
            .await
            .map_err(|e| AssetError::local(format!("writing {relative_path}"), e))?;

        tracing::debug!(slot = %slot, path = %relative_path, size = bytes.len(), "stored local asset");

        Ok(StoredFile {
            url: self.url_for(visibility, &file_name),
            relative_path,
            file_name,
            size_bytes: bytes.len() as u64,
        })
    }

    async fn open(&self, relative_path: &str) -> AssetResult<Option<OpenedFile>> {
        let path = self.resolve(relative_path)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AssetError::local(format!("opening {relative_path}"), e)),
        };
        let meta = file
            .metadata()
            .await
            .map_err(|e| AssetError::local(format!("reading metadata of {relative_path}"), e))?;
        if !meta.is_file() {
            return Ok(None);
        }

        Ok(Some(OpenedFile {
            stream: Box::pin(ReaderStream::new(file)),
            size_bytes: meta.len(),
        }))
    }

    async fn remove(&self, relative_path: &str) -> AssetResult<()> {
        let path = self.resolve(relative_path)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AssetError::local(format!("deleting {relative_path}"), e)),
        }
    }

    async fn list(&self) -> AssetResult<Vec<String>> {
        let mut out = Vec::new();
        for visibility in [Visibility::Public, Visibility::Private] {
            let dir = self.root.join(visibility.dir());
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(AssetError::local(format!("listing {}", visibility.dir()), e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| AssetError::local(format!("listing {}", visibility.dir()), e))?
            {
                let name = entry.file_name().to_string_lossy().to_string();
                // In-flight temp files.
                if name.starts_with('.') {
                    continue;
                }
                let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
                if is_file {
                    out.push(format!("{}/{}", visibility.dir(), name));
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream::StreamExt;
    use tempfile::TempDir;

    async fn read_all(store: &LocalDiskStore, path: &str) -> Vec<u8> {
        let mut opened = store.open(path).await.unwrap().unwrap();
        let mut out = Vec::new();
        while let Some(chunk) = opened.stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn creates_the_directory_tree_lazily() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("nested").join("uploads");
        let store = LocalDiskStore::new(&root);
        assert!(!root.exists());

        let stored = store
            .write(SlotKind::Logo, Bytes::from_static(b"png"), Some("png"))
            .await
            .unwrap();
        assert_eq!(stored.relative_path, "public/logo");
        assert_eq!(stored.url, "/uploads/logo");
        assert!(root.join("public/logo").is_file());

        // Second write into an existing tree is not an error.
        store
            .write(SlotKind::Favicon, Bytes::from_static(b"ico"), Some("ico"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fixed_name_ignores_extension_and_replaces_content() {
        let tmp = TempDir::new().unwrap();
        let store = LocalDiskStore::new(tmp.path());

        let first = store
            .write(SlotKind::Logo, Bytes::from_static(b"first"), Some("png"))
            .await
            .unwrap();
        let second = store
            .write(SlotKind::Logo, Bytes::from_static(b"second"), Some("svg"))
            .await
            .unwrap();

        assert_eq!(first.url, second.url);
        assert_eq!(read_all(&store, &second.relative_path).await, b"second");
        // No temp files left behind.
        assert_eq!(store.list().await.unwrap(), vec!["public/logo".to_string()]);
    }

    #[tokio::test]
    async fn timestamped_names_are_distinct_and_private() {
        let tmp = TempDir::new().unwrap();
        let store = LocalDiskStore::new(tmp.path());

        let a = store
            .write(SlotKind::Cv, Bytes::from_static(b"a"), Some("pdf"))
            .await
            .unwrap();
        let b = store
            .write(SlotKind::Cv, Bytes::from_static(b"b"), Some("pdf"))
            .await
            .unwrap();

        assert_ne!(a.file_name, b.file_name);
        assert!(a.relative_path.starts_with("private/cv-"));
        assert!(a.url.starts_with("/download/cv-"));
        assert!(a.file_name.ends_with(".pdf"));
    }

    #[test]
    fn stamps_are_strictly_increasing() {
        let store = LocalDiskStore::new("unused");
        let mut prev = store.next_stamp();
        for _ in 0..1000 {
            let next = store.next_stamp();
            assert!(next > prev);
            prev = next;
        }
    }

    #[tokio::test]
    async fn remove_missing_file_is_success() {
        let tmp = TempDir::new().unwrap();
        let store = LocalDiskStore::new(tmp.path());
        store.remove("private/cv-1.pdf").await.unwrap();
        store.delete("private/cv-1.pdf").await;
    }

    #[tokio::test]
    async fn open_missing_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = LocalDiskStore::new(tmp.path());
        assert!(store.open("private/nothing.pdf").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn refuses_paths_outside_the_root() {
        let tmp = TempDir::new().unwrap();
        let store = LocalDiskStore::new(tmp.path());
        for bad in ["../secret", "/etc/passwd", "private/../../x", "private/.env", ""] {
            assert!(
                matches!(store.open(bad).await, Err(AssetError::InvalidPath(_))),
                "{bad}"
            );
        }
    }

    #[tokio::test]
    async fn remote_slots_cannot_be_written_locally() {
        let tmp = TempDir::new().unwrap();
        let store = LocalDiskStore::new(tmp.path());
        let err = store
            .write(SlotKind::ProfileImage, Bytes::from_static(b"x"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::InvalidPath(_)));
    }
}
