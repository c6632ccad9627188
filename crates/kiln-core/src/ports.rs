//! Port traits.
//!
//! These traits are the narrow interface between the build orchestrator and
//! the cache tiers, and between the remote tier and the local tier that
//! stages its bytes.

use crate::{CacheKey, FetchResult, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// Stream of artifact bytes read from a remote tier.
pub type ArtifactStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A cache the build orchestrator talks to.
///
/// Runtime failures never escape as fatal errors: `has` degrades to `false`,
/// `fetch` to [`FetchResult::Miss`] or [`FetchResult::Unreadable`], `delete`
/// only logs. `insert` reports [`crate::Error::NonfatalCache`] so callers can
/// note the upload failure and carry on.
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    /// Directory that cached paths are relative to.
    fn artifact_root(&self) -> &Path;

    /// Check whether an artifact exists for the key.
    async fn has(&self, key: &CacheKey) -> bool;

    /// Package the given paths as the artifact for the key.
    async fn insert(&self, key: &CacheKey, paths: &[PathBuf]) -> Result<()>;

    /// Extract the artifact into `results_dir`, or the artifact root when none
    /// is given.
    async fn fetch(&self, key: &CacheKey, results_dir: Option<&Path>) -> FetchResult;

    /// Remove the artifact. Removing a missing artifact is not an error.
    async fn delete(&self, key: &CacheKey);
}

/// The disk tier that creates artifacts and materialises downloaded ones.
#[async_trait]
pub trait LocalTier: ArtifactCache {
    /// Archive the paths into this tier and return the artifact file.
    async fn package(&self, key: &CacheKey, paths: &[PathBuf]) -> Result<PathBuf>;

    /// Store a streamed artifact and extract it in the same operation.
    ///
    /// Nothing becomes visible to [`ArtifactCache::has`] unless the whole
    /// stream was written and extracted successfully.
    async fn store_and_use(
        &self,
        key: &CacheKey,
        stream: ArtifactStream,
        results_dir: Option<&Path>,
    ) -> Result<()>;
}
