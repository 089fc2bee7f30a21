use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};

/// A transient local URL backing fetched bytes. Valid until revoked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobUrl(String);

impl BlobUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlobUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creates and releases locally addressable copies of downloaded bytes.
/// Materializing may do I/O and is async. Revoking stays synchronous so that
/// release can run from `Drop`.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    async fn materialize(&self, bytes: &[u8]) -> ClientResult<BlobUrl>;
    fn revoke(&self, url: &BlobUrl);
}

/// Writes each blob to its own file under `dir` and hands out `file://` URLs.
pub struct DiskBlobStore {
    dir: PathBuf,
}

impl DiskBlobStore {
    pub fn new(dir: PathBuf) -> ClientResult<Self> {
        std::fs::create_dir_all(&dir)?;
        let dir = dir.canonicalize()?;
        info!("Blob cache directory: {}", dir.display());
        Ok(Self { dir })
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn materialize(&self, bytes: &[u8]) -> ClientResult<BlobUrl> {
        let path = self.dir.join(Uuid::new_v4().to_string());
        tokio::fs::write(&path, bytes).await?;
        let url = Url::from_file_path(&path)
            .map_err(|_| ClientError::Storage(format!("not an absolute path: {}", path.display())))?;
        Ok(BlobUrl(url.into()))
    }

    fn revoke(&self, url: &BlobUrl) {
        let Some(path) = Url::parse(url.as_str()).ok().and_then(|u| u.to_file_path().ok()) else {
            warn!("Refusing to revoke foreign blob URL {}", url);
            return;
        };
        if !path.starts_with(&self.dir) {
            warn!("Refusing to revoke blob outside cache dir: {}", path.display());
            return;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Blob {} already gone", path.display());
            }
            Err(e) => warn!("Failed to remove blob {}: {}", path.display(), e),
        }
    }
}

/// Keeps blobs in memory under `blob:` URLs. Tracks every URL it ever issued
/// so tests can assert on release.
#[derive(Default)]
pub struct MemoryBlobStore {
    inner: Mutex<MemoryBlobs>,
}

#[derive(Default)]
struct MemoryBlobs {
    live: HashMap<BlobUrl, Vec<u8>>,
    revoked: Vec<BlobUrl>,
    issued: usize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().map(|g| g.live.len()).unwrap_or(0)
    }

    pub fn issued_count(&self) -> usize {
        self.inner.lock().map(|g| g.issued).unwrap_or(0)
    }

    pub fn revoked(&self) -> Vec<BlobUrl> {
        self.inner.lock().map(|g| g.revoked.clone()).unwrap_or_default()
    }

    pub fn is_live(&self, url: &BlobUrl) -> bool {
        self.inner.lock().map(|g| g.live.contains_key(url)).unwrap_or(false)
    }

    pub fn bytes(&self, url: &BlobUrl) -> Option<Vec<u8>> {
        self.inner.lock().ok()?.live.get(url).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn materialize(&self, bytes: &[u8]) -> ClientResult<BlobUrl> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| ClientError::Storage(format!("Blob lock poisoned: {}", e)))?;
        let url = BlobUrl(format!("blob:vpnpanel/{}", Uuid::new_v4()));
        inner.live.insert(url.clone(), bytes.to_vec());
        inner.issued += 1;
        Ok(url)
    }

    fn revoke(&self, url: &BlobUrl) {
        if let Ok(mut inner) = self.inner.lock() {
            if inner.live.remove(url).is_none() {
                warn!("Revoking unknown or already revoked blob {}", url);
            }
            inner.revoked.push(url.clone());
        }
    }
}
