//! Gzipped tar archives, the on-disk and on-the-wire artifact format.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use kiln_core::{Error, Result};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Create a `.tgz` archive of `paths`, naming entries relative to `base_dir`.
///
/// Relative paths are resolved against `base_dir`; absolute paths must live
/// under it. Paths that do not exist are skipped.
pub fn create_archive<W: Write>(
    writer: W,
    paths: &[PathBuf],
    base_dir: &Path,
    level: u32,
    dereference_symlinks: bool,
) -> Result<()> {
    let encoder = GzEncoder::new(writer, Compression::new(level));
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(dereference_symlinks);

    for p in paths {
        let (abs_path, name) = if p.is_absolute() {
            let name = p
                .strip_prefix(base_dir)
                .map_err(|_| Error::OutsideArtifactRoot(p.display().to_string()))?;
            (p.clone(), name.to_path_buf())
        } else {
            (base_dir.join(p), p.clone())
        };

        if !abs_path.exists() && abs_path.symlink_metadata().is_err() {
            debug!(path = %abs_path.display(), "Skipping missing path");
            continue;
        }

        if abs_path.is_dir() {
            builder
                .append_dir_all(&name, &abs_path)
                .map_err(|e| Error::Archive(format!("Failed to pack dir: {}", e)))?;
        } else {
            builder
                .append_path_with_name(&abs_path, &name)
                .map_err(|e| Error::Archive(format!("Failed to pack file: {}", e)))?;
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| Error::Archive(format!("Failed to finish tar: {}", e)))?;
    let mut writer = encoder
        .finish()
        .map_err(|e| Error::Archive(format!("Gzip finish failed: {}", e)))?;
    writer.flush()?;
    Ok(())
}

/// Extract a `.tgz` archive into `dest`.
///
/// A truncated or corrupted artifact fails here, which is how the cache
/// detects corruption.
pub fn extract_archive<R: Read>(reader: R, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    archive.set_preserve_mtime(true);
    archive
        .unpack(dest)
        .map_err(|e| Error::Archive(format!("Failed to unpack archive: {}", e)))
}
