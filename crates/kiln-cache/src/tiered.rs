//! Local-first cache backed by a remote tier.

use crate::classify::failure_kind;
use crate::remote::RemoteTier;
use async_trait::async_trait;
use kiln_core::{ArtifactCache, CacheKey, Error, FetchResult, LocalTier, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads through the local tier into the remote one, writes through both.
///
/// The local tier is authoritative: a failed upload keeps the local
/// artifact, and a remote hit is always staged locally before use.
#[derive(Debug)]
pub struct TieredCache<L> {
    local: L,
    remote: RemoteTier,
}

impl<L: LocalTier> TieredCache<L> {
    pub fn new(local: L, remote: RemoteTier) -> Self {
        Self { local, remote }
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn remote(&self) -> &RemoteTier {
        &self.remote
    }
}

#[async_trait]
impl<L: LocalTier> ArtifactCache for TieredCache<L> {
    fn artifact_root(&self) -> &Path {
        self.local.artifact_root()
    }

    async fn has(&self, key: &CacheKey) -> bool {
        self.local.has(key).await || self.remote.has(key).await
    }

    async fn insert(&self, key: &CacheKey, paths: &[PathBuf]) -> Result<()> {
        let artifact = self
            .local
            .package(key, paths)
            .await
            .map_err(|e| Error::NonfatalCache {
                key: key.to_string(),
                kind: failure_kind(&e),
                message: e.to_string(),
            })?;
        self.remote.upload(key, &artifact).await
    }

    async fn fetch(&self, key: &CacheKey, results_dir: Option<&Path>) -> FetchResult {
        let local = self.local.fetch(key, results_dir).await;
        if local.is_hit() {
            return local;
        }

        // A corrupt local copy has already been removed; a good remote copy
        // replaces it.
        match self.remote.fetch(key, &self.local, results_dir).await {
            FetchResult::Miss if local.is_unreadable() => local,
            remote => {
                debug!(key = %key, hit = remote.is_hit(), "Remote cache lookup");
                remote
            }
        }
    }

    async fn delete(&self, key: &CacheKey) {
        self.local.delete(key).await;
        self.remote.delete(key).await;
    }
}
