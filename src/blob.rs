//! Blob storage for signed files
//!
//! A blob store persists the bytes of an uploaded file and hands back a
//! locator string that can later be used to fetch them again. Stored names
//! are `<uuid>_<original name>` so uploads never collide while the original
//! name can still be recovered for downloads.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use axum::body::Bytes;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

const DEFAULT_FILE_NAME: &str = "document.pdf";
const LOCAL_SCHEME: &str = "file://";
const MEMORY_SCHEME: &str = "memory://";
const PARTIAL_EXT: &str = "part";

/// What the uploader told us about the file
#[derive(Debug, Clone, Default)]
pub struct ContentHint {
    pub file_name: Option<String>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `bytes`, returning a locator for them
    async fn store(&self, bytes: Bytes, hint: &ContentHint) -> ApiResult<String>;

    /// Read back the bytes behind a locator
    async fn fetch(&self, locator: &str) -> ApiResult<Bytes>;
}

/// Replace whitespace with `_` and drop anything that is not safe in a file
/// name
pub fn sanitize_file_name(name: Option<&str>) -> String {
    let cleaned: String = name
        .unwrap_or_default()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        DEFAULT_FILE_NAME.to_string()
    } else {
        cleaned
    }
}

fn unique_name(hint: &ContentHint) -> String {
    format!(
        "{}_{}",
        Uuid::new_v4().simple(),
        sanitize_file_name(hint.file_name.as_deref())
    )
}

/// File name to offer on download: the last path segment of the locator
/// without its unique prefix
pub fn download_name(locator: &str) -> String {
    let stored = locator.rsplit('/').next().unwrap_or(locator);
    let name = match stored.split_once('_') {
        Some((_, rest)) => rest,
        None => stored,
    };
    if name.is_empty() {
        DEFAULT_FILE_NAME.to_string()
    } else {
        name.to_string()
    }
}

// ============ Local Disk ============

/// Stores files under a directory on local disk
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Remove `.part` files left behind by uploads that never finished,
    /// e.g. when a store call was abandoned on timeout
    pub async fn sweep_partial(&self) -> std::io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == PARTIAL_EXT) {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Map a locator back to a path inside `root`
    fn path_for(&self, locator: &str) -> ApiResult<PathBuf> {
        let name = locator
            .strip_prefix(LOCAL_SCHEME)
            .and_then(|p| Path::new(p).file_name())
            .and_then(|n| n.to_str())
            .ok_or_else(|| ApiError::storage(format!("Unrecognised locator: {locator}")))?;
        let path = self.root.join(name);
        if path.to_str().map(|p| format!("{LOCAL_SCHEME}{p}")) != Some(locator.to_string()) {
            return Err(ApiError::storage(format!(
                "Locator outside upload directory: {locator}"
            )));
        }
        Ok(path)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(&self, bytes: Bytes, hint: &ContentHint) -> ApiResult<String> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ApiError::storage(format!("Failed to create upload directory: {e}")))?;

        let path = self.root.join(unique_name(hint));
        let temp_path = path.with_extension(PARTIAL_EXT);
        let written = match tokio::fs::write(&temp_path, &bytes).await {
            Ok(()) => tokio::fs::rename(&temp_path, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(ApiError::storage(format!("Failed to write upload: {e}")));
        }

        let path = path
            .to_str()
            .ok_or_else(|| ApiError::storage("Upload path is not valid UTF-8"))?;
        tracing::debug!("Stored {} bytes at {}", bytes.len(), path);
        Ok(format!("{LOCAL_SCHEME}{path}"))
    }

    async fn fetch(&self, locator: &str) -> ApiResult<Bytes> {
        let path = self.path_for(locator)?;
        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| ApiError::storage(format!("Failed to read {locator}: {e}")))
    }
}

// ============ In Memory ============

/// Keeps files in memory; used by tests and ephemeral deployments
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Bytes>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(&self, bytes: Bytes, hint: &ContentHint) -> ApiResult<String> {
        let locator = format!("{MEMORY_SCHEME}{}", unique_name(hint));
        self.blobs.insert(locator.clone(), bytes);
        Ok(locator)
    }

    async fn fetch(&self, locator: &str) -> ApiResult<Bytes> {
        self.blobs
            .get(locator)
            .map(|r| r.value().clone())
            .ok_or_else(|| ApiError::storage(format!("No blob at {locator}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint(name: &str) -> ContentHint {
        ContentHint {
            file_name: Some(name.into()),
        }
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name(Some("my lease.pdf")), "my_lease.pdf");
        assert_eq!(sanitize_file_name(Some("../../etc/passwd")), "passwd");
        assert_eq!(sanitize_file_name(Some("C:\\docs\\a b.pdf")), "a_b.pdf");
        assert_eq!(sanitize_file_name(Some("..")), DEFAULT_FILE_NAME);
        assert_eq!(sanitize_file_name(None), DEFAULT_FILE_NAME);
    }

    #[test]
    fn test_download_name() {
        assert_eq!(
            download_name("file:///data/uploads/0f3a_my_lease.pdf"),
            "my_lease.pdf"
        );
        assert_eq!(download_name("memory://abc_doc.pdf"), "doc.pdf");
        assert_eq!(download_name("https://cdn.example.com/plain.pdf"), "plain.pdf");
    }

    #[tokio::test]
    async fn test_local_store_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().join("uploads"));

        let locator = store
            .store(Bytes::from_static(b"%PDF-1.7 signed"), &hint("lease.pdf"))
            .await
            .unwrap();
        assert!(locator.starts_with("file://"));
        assert!(locator.ends_with("_lease.pdf"));
        assert_eq!(download_name(&locator), "lease.pdf");

        let bytes = store.fetch(&locator).await.unwrap();
        assert_eq!(&bytes[..], b"%PDF-1.7 signed");

        let other = store
            .store(Bytes::from_static(b"second"), &hint("lease.pdf"))
            .await
            .unwrap();
        assert_ne!(locator, other);
    }

    #[tokio::test]
    async fn test_sweep_partial_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let kept = store
            .store(Bytes::from_static(b"%PDF"), &hint("kept.pdf"))
            .await
            .unwrap();
        std::fs::write(dir.path().join("abc_lost.part"), b"half").unwrap();

        assert_eq!(store.sweep_partial().await.unwrap(), 1);
        assert!(!dir.path().join("abc_lost.part").exists());
        assert_eq!(&store.fetch(&kept).await.unwrap()[..], b"%PDF");

        let missing = LocalBlobStore::new(dir.path().join("never-created"));
        assert_eq!(missing.sweep_partial().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_local_fetch_rejects_foreign_locators() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        assert!(matches!(
            store.fetch("file:///etc/passwd").await,
            Err(ApiError::Storage(_))
        ));
        assert!(matches!(
            store.fetch("https://example.com/x.pdf").await,
            Err(ApiError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryBlobStore::new();
        let locator = store
            .store(Bytes::from_static(b"abc"), &ContentHint::default())
            .await
            .unwrap();
        assert_eq!(download_name(&locator), DEFAULT_FILE_NAME);
        assert_eq!(&store.fetch(&locator).await.unwrap()[..], b"abc");
        assert_eq!(store.len(), 1);
        assert!(store.fetch("memory://missing").await.is_err());
    }
}
