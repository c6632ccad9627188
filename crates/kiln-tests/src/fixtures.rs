//! Test fixtures for build outputs and cache directories.

use kiln_core::CacheKey;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A build workspace: an artifact root holding outputs, a separate local
/// cache directory, and scratch space for credentials files.
pub struct ArtifactWorkspace {
    root: TempDir,
    cache: TempDir,
    scratch: TempDir,
}

impl ArtifactWorkspace {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().expect("Failed to create artifact root"),
            cache: TempDir::new().expect("Failed to create cache dir"),
            scratch: TempDir::new().expect("Failed to create scratch dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn cache_dir(&self) -> &Path {
        self.cache.path()
    }

    pub fn scratch(&self) -> &Path {
        self.scratch.path()
    }

    /// Cache dir as a spec token.
    pub fn local_token(&self) -> String {
        self.cache_dir().to_string_lossy().into_owned()
    }

    /// Write an output file and return its path relative to the root.
    pub fn write(&self, rel: &str, contents: &[u8]) -> PathBuf {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create output dir");
        }
        fs::write(&path, contents).expect("Failed to write output");
        PathBuf::from(rel)
    }

    pub fn read(&self, rel: &str) -> Option<Vec<u8>> {
        fs::read(self.root().join(rel)).ok()
    }

    /// Remove an output, as a clean build would.
    pub fn remove(&self, rel: &str) {
        let path = self.root().join(rel);
        if path.is_dir() {
            fs::remove_dir_all(&path).expect("Failed to remove output dir");
        } else if path.exists() {
            fs::remove_file(&path).expect("Failed to remove output");
        }
    }

    /// A typical set of outputs for one target.
    pub fn write_target_outputs(&self, target: &str) -> Vec<PathBuf> {
        self.write(&format!("dist/{}/bin/{}", target, target), b"\x7fELF fake binary");
        self.write(
            &format!("dist/{}/share/manifest.json", target),
            format!("{{\"target\":\"{}\"}}", target).as_bytes(),
        );
        vec![PathBuf::from(format!("dist/{}", target))]
    }
}

impl Default for ArtifactWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Factory for cache keys.
pub struct KeyFixture;

impl KeyFixture {
    pub fn key(id: &str) -> CacheKey {
        CacheKey::new(id, format!("{:0>16x}", fnv1a(id)))
    }

    pub fn with_hash(id: &str, hash: &str) -> CacheKey {
        CacheKey::new(id, hash)
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes()
        .fold(0xcbf2_9ce4_8422_2325, |h, b| (h ^ b as u64).wrapping_mul(0x0100_0000_01b3))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_outputs() {
        let ws = ArtifactWorkspace::new();
        let paths = ws.write_target_outputs("app");
        assert_eq!(paths, vec![PathBuf::from("dist/app")]);
        assert!(ws.read("dist/app/bin/app").is_some());

        ws.remove("dist/app");
        assert!(ws.read("dist/app/bin/app").is_none());
    }

    #[test]
    fn test_keys_are_stable() {
        assert_eq!(KeyFixture::key("app"), KeyFixture::key("app"));
        assert_ne!(KeyFixture::key("app").hash(), KeyFixture::key("lib").hash());
        assert_eq!(KeyFixture::key("app").hash().len(), 16);
    }
}
