use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

/// Existence check for a candidate image path. Existence is judged by a
/// decode attempt on the fetched bytes, not by a metadata query; every
/// failure mode (missing resource, transport error, undecodable bytes)
/// folds to `false` and never surfaces as an error.
#[async_trait]
pub trait ImageProbe: Send + Sync {
    async fn exists(&self, path: &str) -> bool;
}

pub type SharedImageProbe = Arc<dyn ImageProbe>;

/// Raw byte access behind the decode probe. Implementations map
/// document-space paths (`/assets/images-webp/a.webp`) onto their own
/// resource space.
#[async_trait]
pub trait ByteSource: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, String>;
}

/// Fetch-then-decode probe over any byte source.
pub struct DecodeProbe<S: ByteSource> {
    source: S,
}

impl<S: ByteSource> DecodeProbe<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<S: ByteSource> ImageProbe for DecodeProbe<S> {
    async fn exists(&self, path: &str) -> bool {
        let bytes = match self.source.fetch(path).await {
            Ok(bytes) => bytes,
            Err(reason) => {
                debug!(path, reason = reason.as_str(), "candidate fetch failed");
                return false;
            }
        };
        match image::load_from_memory(bytes.as_slice()) {
            Ok(_) => true,
            Err(e) => {
                debug!(path, error = %e, "candidate bytes did not decode");
                false
            }
        }
    }
}

/// Maps document-absolute paths under a local site root.
#[derive(Debug, Clone)]
pub struct FsByteSource {
    site_root: PathBuf,
}

impl FsByteSource {
    pub fn new(site_root: impl Into<PathBuf>) -> Self {
        Self {
            site_root: site_root.into(),
        }
    }

    fn local_path(&self, path: &str) -> PathBuf {
        let relative = path.trim_start_matches('/');
        self.site_root.join(Path::new(relative))
    }
}

#[async_trait]
impl ByteSource for FsByteSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, String> {
        let local = self.local_path(path);
        let display = local.display().to_string();
        tokio::task::spawn_blocking(move || std::fs::read(local))
            .await
            .map_err(|e| format!("read task for '{display}' failed: {e}"))?
            .map_err(|e| format!("read '{display}': {e}"))
    }
}

/// Resolves document-absolute paths against a served base URL.
#[derive(Debug, Clone)]
pub struct HttpByteSource {
    client: reqwest::Client,
    base: Url,
}

impl HttpByteSource {
    pub fn new(base: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }
}

#[async_trait]
impl ByteSource for HttpByteSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, String> {
        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| format!("join '{path}' onto '{}': {e}", self.base))?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| format!("GET {url}: {e}"))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("read body of {url}: {e}"))?;
        Ok(bytes.to_vec())
    }
}
