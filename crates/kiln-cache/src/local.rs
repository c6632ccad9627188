//! Local disk tier.
//!
//! Artifacts live at `<cache_root>/<id>/<hash>.tgz`. Writes go to a uniquely
//! named temp file next to the final path and are renamed into place only
//! once complete, so concurrent readers never observe a partial artifact.

use crate::archiver;
use crate::classify::failure_kind;
use crate::config::TierConfig;
use crate::keys::encode_component;
use async_trait::async_trait;
use futures::StreamExt;
use kiln_core::{
    ARCHIVE_EXTENSION, ArtifactCache, ArtifactStream, CacheKey, Error, FetchResult, LocalTier,
    Result,
};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Disk-backed artifact cache.
#[derive(Debug)]
pub struct LocalArtifactCache {
    artifact_root: PathBuf,
    extraction_root: PathBuf,
    cache_root: PathBuf,
    compression_level: u32,
    max_entries_per_target: Option<usize>,
    dereference_symlinks: bool,
    write_mode: Option<u32>,
    staging: Option<TempDir>,
}

impl LocalArtifactCache {
    pub fn new(
        artifact_root: impl Into<PathBuf>,
        cache_root: impl Into<PathBuf>,
        config: &TierConfig,
    ) -> Self {
        let artifact_root = artifact_root.into();
        let extraction_root = resolve_extraction_root(&artifact_root);
        let write_mode = config.write_mode().unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring write_permissions");
            None
        });
        Self {
            artifact_root,
            extraction_root,
            cache_root: cache_root.into(),
            compression_level: config.level(),
            max_entries_per_target: config.max_entries(),
            dereference_symlinks: config.dereference_symlinks,
            write_mode,
            staging: None,
        }
    }

    /// A process-lifetime cache in a temp dir, used to stage bytes for a
    /// remote-only configuration. The directory is removed on drop.
    pub fn ephemeral(artifact_root: impl Into<PathBuf>, config: &TierConfig) -> Result<Self> {
        let staging = tempfile::Builder::new()
            .prefix("kiln-staging-")
            .tempdir()?;
        let mut cache = Self::new(artifact_root, staging.path(), config);
        cache.staging = Some(staging);
        Ok(cache)
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Directory archives are extracted into when no results dir is given.
    pub fn extraction_root(&self) -> &Path {
        &self.extraction_root
    }

    pub fn is_ephemeral(&self) -> bool {
        self.staging.is_some()
    }

    /// Where the artifact for a key lives on disk.
    pub fn artifact_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_root
            .join(encode_component(key.id()))
            .join(format!("{}.{}", encode_component(key.hash()), ARCHIVE_EXTENSION))
    }

    fn temp_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_root.join(encode_component(key.id())).join(format!(
            ".{}.{}.tmp",
            encode_component(key.hash()),
            uuid::Uuid::new_v4()
        ))
    }

    /// Move a finished temp file into place with the configured mode.
    async fn publish(&self, tmp: &Path, final_path: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = self.write_mode {
                tokio::fs::set_permissions(tmp, std::fs::Permissions::from_mode(mode)).await?;
            }
        }
        tokio::fs::rename(tmp, final_path).await?;
        Ok(())
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn extract(&self, artifact: PathBuf, dest: PathBuf) -> Result<()> {
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&artifact)?;
            archiver::extract_archive(std::io::BufReader::new(file), &dest)
        })
        .await
        .map_err(|e| Error::Internal(format!("Extraction task failed: {}", e)))?
    }

    async fn spool(stream: ArtifactStream, tmp: &Path) -> Result<u64> {
        let mut stream = stream;
        let mut file = tokio::fs::File::create(tmp).await?;
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    async fn prune(&self, key: &CacheKey) {
        let Some(max_entries) = self.max_entries_per_target else {
            return;
        };
        let keep = self.artifact_path(key);
        let pruned =
            tokio::task::spawn_blocking(move || prune_dir(&keep, max_entries)).await;
        match pruned {
            Ok(Ok(0)) => {}
            Ok(Ok(removed)) => debug!(key = %key, removed, "Pruned old artifacts"),
            Ok(Err(e)) => warn!(key = %key, error = %e, "Failed to prune old artifacts"),
            Err(e) => warn!(key = %key, error = %e, "Prune task failed"),
        }
    }

    fn results_dir(&self, results_dir: Option<&Path>) -> PathBuf {
        results_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.extraction_root.clone())
    }
}

/// Follow a symlinked artifact root once so extraction writes straight into
/// the real directory.
fn resolve_extraction_root(artifact_root: &Path) -> PathBuf {
    match std::fs::read_link(artifact_root) {
        Ok(target) if target.is_absolute() => target,
        Ok(target) => artifact_root
            .parent()
            .map(|parent| parent.join(&target))
            .unwrap_or(target),
        Err(_) => artifact_root.to_path_buf(),
    }
}

/// Remove all but the newest `max_entries` artifacts next to `keep`, never
/// removing `keep` itself.
fn prune_dir(keep: &Path, max_entries: usize) -> std::io::Result<usize> {
    let Some(dir) = keep.parent() else {
        return Ok(0);
    };
    let mut others: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path == keep || path.extension().is_none_or(|ext| ext != ARCHIVE_EXTENSION) {
            continue;
        }
        let modified = std::fs::metadata(&path)?.modified()?;
        others.push((modified, path));
    }
    others.sort_by(|a, b| b.0.cmp(&a.0));

    let mut removed = 0;
    for (_, path) in others.into_iter().skip(max_entries.saturating_sub(1)) {
        std::fs::remove_file(&path)?;
        removed += 1;
    }
    Ok(removed)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "Failed to remove temp artifact");
    }
}

#[async_trait]
impl ArtifactCache for LocalArtifactCache {
    fn artifact_root(&self) -> &Path {
        &self.artifact_root
    }

    async fn has(&self, key: &CacheKey) -> bool {
        tokio::fs::try_exists(self.artifact_path(key))
            .await
            .unwrap_or(false)
    }

    async fn insert(&self, key: &CacheKey, paths: &[PathBuf]) -> Result<()> {
        self.package(key, paths)
            .await
            .map(|_| ())
            .map_err(|e| Error::NonfatalCache {
                key: key.to_string(),
                kind: failure_kind(&e),
                message: e.to_string(),
            })
    }

    async fn fetch(&self, key: &CacheKey, results_dir: Option<&Path>) -> FetchResult {
        let artifact = self.artifact_path(key);
        if !self.has(key).await {
            return FetchResult::Miss;
        }

        match self.extract(artifact.clone(), self.results_dir(results_dir)).await {
            Ok(()) => {
                debug!(key = %key, "Local cache hit");
                FetchResult::Hit
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Removing unreadable local artifact");
                discard(&artifact).await;
                FetchResult::Unreadable {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn delete(&self, key: &CacheKey) {
        let artifact = self.artifact_path(key);
        match tokio::fs::remove_file(&artifact).await {
            Ok(()) => debug!(key = %key, "Deleted local artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(key = %key, error = %e, "Failed to delete local artifact"),
        }
    }
}

#[async_trait]
impl LocalTier for LocalArtifactCache {
    async fn package(&self, key: &CacheKey, paths: &[PathBuf]) -> Result<PathBuf> {
        let final_path = self.artifact_path(key);
        let tmp = self.temp_path(key);
        Self::ensure_parent(&final_path).await?;

        let root = self.artifact_root.clone();
        let paths = paths.to_vec();
        let level = self.compression_level;
        let dereference = self.dereference_symlinks;
        let target = tmp.clone();
        let packed = tokio::task::spawn_blocking(move || {
            let file = std::fs::File::create(&target)?;
            archiver::create_archive(
                std::io::BufWriter::new(file),
                &paths,
                &root,
                level,
                dereference,
            )
        })
        .await
        .map_err(|e| Error::Internal(format!("Archive task failed: {}", e)))
        .and_then(|packed| packed);

        let result = match packed {
            Ok(()) => self.publish(&tmp, &final_path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            discard(&tmp).await;
            return Err(e);
        }

        debug!(key = %key, artifact = %final_path.display(), "Packaged artifact");
        self.prune(key).await;
        Ok(final_path)
    }

    async fn store_and_use(
        &self,
        key: &CacheKey,
        stream: ArtifactStream,
        results_dir: Option<&Path>,
    ) -> Result<()> {
        let final_path = self.artifact_path(key);
        let tmp = self.temp_path(key);
        Self::ensure_parent(&final_path).await?;

        let dest = self.results_dir(results_dir);
        let result = async {
            let written = Self::spool(stream, &tmp).await?;
            self.extract(tmp.clone(), dest).await?;
            self.publish(&tmp, &final_path).await?;
            Ok::<u64, Error>(written)
        }
        .await;

        match result {
            Ok(written) => {
                debug!(key = %key, bytes = written, "Stored remote artifact locally");
                self.prune(key).await;
                Ok(())
            }
            Err(e) => {
                discard(&tmp).await;
                Err(e)
            }
        }
    }
}
