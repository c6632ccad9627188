//! Remote cache tier.
//!
//! A [`RemoteTier`] owns one [`RemoteStore`] (object store or HTTP cache)
//! and the key prefix under which artifacts live. Stores only move bytes and
//! classify their own transport errors; the tier decides what each failure
//! means for the caller.

pub mod credentials;
pub mod http;
pub mod s3;

pub use http::HttpStore;
pub use s3::S3Store;

use crate::classify::log_and_classify;
use async_trait::async_trait;
use kiln_core::{
    ArtifactStream, CacheKey, Error, FailureKind, FetchResult, LocalTier, Result,
};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Backend family of a remote URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    S3,
    Http,
}

impl RemoteKind {
    /// Backend family for a URL scheme, if the scheme is recognised.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "s3" => Some(RemoteKind::S3),
            "http" | "https" => Some(RemoteKind::Http),
            _ => None,
        }
    }
}

impl fmt::Display for RemoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteKind::S3 => f.write_str("s3"),
            RemoteKind::Http => f.write_str("http"),
        }
    }
}

/// Byte transport for one remote backend.
///
/// Paths are object paths relative to the store's root. Every error returned
/// is an [`Error::Remote`] already carrying its [`FailureKind`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn kind(&self) -> RemoteKind;

    /// Human-readable location, for logs.
    fn location(&self) -> String;

    /// Metadata-only existence check.
    async fn head(&self, path: &str) -> Result<()>;

    /// Open a streamed read of the object.
    async fn get(&self, path: &str) -> Result<ArtifactStream>;

    /// Upload a local file as the object.
    async fn put(&self, path: &str, artifact: &Path) -> Result<()>;

    /// Remove the object. Removing a missing object succeeds.
    async fn delete(&self, path: &str) -> Result<()>;
}

/// The remote half of a tiered cache.
#[derive(Clone)]
pub struct RemoteTier {
    store: Arc<dyn RemoteStore>,
    prefix: String,
}

impl RemoteTier {
    pub fn new(store: Arc<dyn RemoteStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn kind(&self) -> RemoteKind {
        self.store.kind()
    }

    pub fn location(&self) -> String {
        self.store.location()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn path_for(&self, key: &CacheKey) -> String {
        key.remote_address(&self.prefix)
    }

    /// Whether the artifact exists remotely. Failures count as absent.
    pub async fn has(&self, key: &CacheKey) -> bool {
        debug!(key = %key, "HEAD");
        match self.store.head(&self.path_for(key)).await {
            Ok(()) => true,
            Err(e) => {
                log_and_classify(&e, "HEAD", key);
                false
            }
        }
    }

    /// Stream the artifact into the local tier and extract it.
    ///
    /// Missing objects and outages are misses; anything else is reported as
    /// an unreadable artifact.
    pub async fn fetch(
        &self,
        key: &CacheKey,
        local: &dyn LocalTier,
        results_dir: Option<&Path>,
    ) -> FetchResult {
        debug!(key = %key, "GET");
        let stream = match self.store.get(&self.path_for(key)).await {
            Ok(stream) => stream,
            Err(e) => return self.read_failure(&e, key),
        };

        match local.store_and_use(key, stream, results_dir).await {
            Ok(()) => FetchResult::Hit,
            Err(e) => self.read_failure(&e, key),
        }
    }

    fn read_failure(&self, err: &Error, key: &CacheKey) -> FetchResult {
        match log_and_classify(err, "GET", key) {
            FailureKind::NotFound | FailureKind::Network => FetchResult::Miss,
            FailureKind::Unknown => FetchResult::Unreadable {
                key: key.to_string(),
                reason: err.to_string(),
            },
        }
    }

    /// Upload an artifact already packaged by the local tier.
    pub async fn upload(&self, key: &CacheKey, artifact: &Path) -> Result<()> {
        debug!(key = %key, artifact = %artifact.display(), "PUT");
        self.store
            .put(&self.path_for(key), artifact)
            .await
            .map_err(|e| {
                let kind = log_and_classify(&e, "PUT", key);
                Error::NonfatalCache {
                    key: key.to_string(),
                    kind,
                    message: e.to_string(),
                }
            })
    }

    /// Remove the artifact remotely. Failures are logged, never returned.
    pub async fn delete(&self, key: &CacheKey) {
        debug!(key = %key, "DELETE");
        if let Err(e) = self.store.delete(&self.path_for(key)).await {
            log_and_classify(&e, "DELETE", key);
        }
    }
}

impl fmt::Debug for RemoteTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTier")
            .field("kind", &self.kind())
            .field("location", &self.location())
            .field("prefix", &self.prefix)
            .finish()
    }
}
