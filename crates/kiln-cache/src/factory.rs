//! Turns a [`CacheSpec`] into a working cache.

use crate::config::TierConfig;
use crate::local::LocalArtifactCache;
use crate::remote::{HttpStore, RemoteKind, RemoteStore, RemoteTier, S3Store, s3};
use crate::selector::{EndpointSelector, HttpPinger, Pinger};
use crate::spec::{CacheSpec, RemoteSpec};
use crate::tiered::TieredCache;
use async_trait::async_trait;
use kiln_core::{ArtifactCache, CacheKey, Error, FetchResult, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// A cache ready for use by the build.
#[derive(Debug)]
pub enum ConfiguredCache {
    Local(LocalArtifactCache),
    Tiered(TieredCache<LocalArtifactCache>),
}

impl ConfiguredCache {
    fn inner(&self) -> &dyn ArtifactCache {
        match self {
            ConfiguredCache::Local(cache) => cache,
            ConfiguredCache::Tiered(cache) => cache,
        }
    }

    pub fn is_tiered(&self) -> bool {
        matches!(self, ConfiguredCache::Tiered(_))
    }

    /// The local tier, whether it is the whole cache or the staging half of
    /// a tiered one.
    pub fn local(&self) -> &LocalArtifactCache {
        match self {
            ConfiguredCache::Local(cache) => cache,
            ConfiguredCache::Tiered(cache) => cache.local(),
        }
    }

    pub fn remote(&self) -> Option<&RemoteTier> {
        match self {
            ConfiguredCache::Local(_) => None,
            ConfiguredCache::Tiered(cache) => Some(cache.remote()),
        }
    }
}

#[async_trait]
impl ArtifactCache for ConfiguredCache {
    fn artifact_root(&self) -> &Path {
        self.inner().artifact_root()
    }

    async fn has(&self, key: &CacheKey) -> bool {
        self.inner().has(key).await
    }

    async fn insert(&self, key: &CacheKey, paths: &[PathBuf]) -> Result<()> {
        self.inner().insert(key, paths).await
    }

    async fn fetch(&self, key: &CacheKey, results_dir: Option<&Path>) -> FetchResult {
        self.inner().fetch(key, results_dir).await
    }

    async fn delete(&self, key: &CacheKey) {
        self.inner().delete(key).await
    }
}

/// Builds caches for one artifact root.
///
/// The S3 client is created on first use and shared by every cache this
/// factory builds.
pub struct CacheFactory {
    artifact_root: PathBuf,
    config: TierConfig,
    pinger: Arc<dyn Pinger>,
    s3_client: OnceCell<aws_sdk_s3::Client>,
}

impl CacheFactory {
    /// Validates the tier config up front; a bad compression level is a
    /// startup error.
    pub fn new(artifact_root: impl Into<PathBuf>, config: TierConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            artifact_root: artifact_root.into(),
            config,
            pinger: Arc::new(HttpPinger::default()),
            s3_client: OnceCell::new(),
        })
    }

    pub fn with_pinger(mut self, pinger: Arc<dyn Pinger>) -> Self {
        self.pinger = pinger;
        self
    }

    pub fn config(&self) -> &TierConfig {
        &self.config
    }

    pub fn artifact_root(&self) -> &Path {
        &self.artifact_root
    }

    /// Build the cache a spec describes, or `None` when its only remote
    /// group is unreachable and there is no local tier to fall back to.
    pub async fn build(&self, spec: &CacheSpec) -> Result<Option<ConfiguredCache>> {
        let Some(remote_spec) = spec.remote() else {
            return Ok(spec.local().map(|path| ConfiguredCache::Local(self.local(path))));
        };

        match self.remote_tier(remote_spec).await? {
            Some(remote) => {
                let local = match spec.local() {
                    Some(path) => self.local(path),
                    None => LocalArtifactCache::ephemeral(&self.artifact_root, &self.config)?,
                };
                info!(
                    remote = %remote.location(),
                    prefix = remote.prefix(),
                    staging = local.is_ephemeral(),
                    "Using tiered artifact cache"
                );
                Ok(Some(ConfiguredCache::Tiered(TieredCache::new(local, remote))))
            }
            None => match spec.local() {
                Some(path) => {
                    warn!(
                        local = %path.display(),
                        "No remote cache endpoint responded, using local cache only"
                    );
                    Ok(Some(ConfiguredCache::Local(self.local(path))))
                }
                None => {
                    warn!("No remote cache endpoint responded, artifact caching is disabled");
                    Ok(None)
                }
            },
        }
    }

    /// Parse tokens and build in one step.
    pub async fn build_from_tokens<S: AsRef<str>>(
        &self,
        tokens: &[S],
    ) -> Result<Option<ConfiguredCache>> {
        let spec = CacheSpec::parse(tokens)?;
        self.build(&spec).await
    }

    fn local(&self, cache_root: &Path) -> LocalArtifactCache {
        LocalArtifactCache::new(&self.artifact_root, cache_root, &self.config)
    }

    async fn s3_client(&self) -> &aws_sdk_s3::Client {
        self.s3_client
            .get_or_init(|| s3::build_client(&self.config))
            .await
    }

    async fn remote_tier(&self, remote: &RemoteSpec) -> Result<Option<RemoteTier>> {
        match remote.kind() {
            RemoteKind::S3 => {
                // A bucket has no host worth probing.
                let url = &remote.urls()[0];
                let bucket = url.host_str().ok_or_else(|| {
                    Error::spec_format(url.as_str(), "object store URL has no bucket")
                })?;
                let store = S3Store::new(
                    self.s3_client().await.clone(),
                    bucket,
                    self.config.write_timeout(),
                );
                Ok(Some(RemoteTier::new(
                    Arc::new(store) as Arc<dyn RemoteStore>,
                    RemoteSpec::prefix_of(url),
                )))
            }
            RemoteKind::Http => {
                let candidates: Vec<String> =
                    remote.urls().iter().map(|u| u.to_string()).collect();
                let selector =
                    EndpointSelector::new(self.pinger.clone(), self.config.probe_timeout());
                let Some(best) = selector.select(&candidates).await else {
                    return Ok(None);
                };
                let url = remote
                    .urls()
                    .iter()
                    .find(|u| u.as_str() == best)
                    .ok_or_else(|| Error::Internal(format!("Selected unknown endpoint {}", best)))?;
                let store = HttpStore::new(url, &self.config)?;
                Ok(Some(RemoteTier::new(
                    Arc::new(store) as Arc<dyn RemoteStore>,
                    RemoteSpec::prefix_of(url),
                )))
            }
        }
    }
}

/// Which caches the build reads from and writes to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    pub read: bool,
    pub write: bool,
    pub read_from: Vec<String>,
    pub write_to: Vec<String>,
}

/// Read and write caches built from one set of options.
pub struct CacheSetup {
    options: CacheOptions,
    factory: CacheFactory,
}

impl CacheSetup {
    pub fn new(options: CacheOptions, factory: CacheFactory) -> Self {
        Self { options, factory }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn factory(&self) -> &CacheFactory {
        &self.factory
    }

    /// The cache to read artifacts from, if reading is enabled and configured.
    pub async fn read_cache(&self) -> Result<Option<ConfiguredCache>> {
        self.cache_for(self.options.read, &self.options.read_from, "read")
            .await
    }

    /// The cache to write artifacts to, if writing is enabled and configured.
    pub async fn write_cache(&self) -> Result<Option<ConfiguredCache>> {
        self.cache_for(self.options.write, &self.options.write_to, "write")
            .await
    }

    async fn cache_for(
        &self,
        enabled: bool,
        tokens: &[String],
        purpose: &str,
    ) -> Result<Option<ConfiguredCache>> {
        if !enabled || tokens.is_empty() {
            return Ok(None);
        }
        let cache = self.factory.build_from_tokens(tokens).await?;
        if cache.is_none() {
            warn!(purpose, "Artifact cache unavailable");
        }
        Ok(cache)
    }
}
