//! CLI configuration management.

use kiln_cache::{CacheOptions, TierConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KilnConfig {
    /// Directory cached paths are relative to.
    #[serde(default = "default_artifact_root")]
    pub artifact_root: PathBuf,
    /// Read/write switches and cache specs.
    #[serde(default)]
    pub cache: CacheOptions,
    /// Tier tuning.
    #[serde(default)]
    pub tier: TierConfig,
    /// Output format.
    #[serde(default)]
    pub output_format: OutputFormat,
}

fn default_artifact_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            artifact_root: default_artifact_root(),
            cache: CacheOptions::default(),
            tier: TierConfig::default(),
            output_format: OutputFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl KilnConfig {
    /// Load configuration from `path`, or from the default location when no
    /// path is given. A missing default file yields the defaults; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = Self::config_path()?;
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dirs = directories::ProjectDirs::from("build", "kiln", "kiln")
            .ok_or("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.yaml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.yaml");
        std::fs::write(
            &path,
            r#"
artifact_root: /work/repo
output_format: json
cache:
  read: true
  write: true
  read_from: ["/var/cache/kiln", "https://cache.example.com/artifacts"]
  write_to: ["/var/cache/kiln"]
tier:
  compression_level: 7
  max_entries_per_target: 3
"#,
        )
        .unwrap();

        let config = KilnConfig::load(Some(&path)).unwrap();
        assert_eq!(config.artifact_root, PathBuf::from("/work/repo"));
        assert_eq!(config.output_format, OutputFormat::Json);
        assert!(config.cache.read);
        assert_eq!(config.cache.read_from.len(), 2);
        assert_eq!(config.tier.compression_level, 7);
        assert_eq!(config.tier.max_entries(), Some(3));
        assert_eq!(config.tier.read_timeout_secs, 4);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(KilnConfig::load(Some(&dir.path().join("absent.yaml"))).is_err());
    }

    #[test]
    fn test_defaults() {
        let config: KilnConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.artifact_root, PathBuf::from("."));
        assert!(!config.cache.read);
        assert!(config.cache.write_to.is_empty());
        assert_eq!(config.output_format, OutputFormat::Table);
    }
}
