//! Tier configuration.

use kiln_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Settings shared by every tier built for one process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Gzip level used when packaging artifacts, 0-9.
    #[serde(default = "default_compression_level")]
    pub compression_level: i64,
    /// Read timeout for remote requests, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Write timeout for remote uploads, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub write_timeout_secs: u64,
    /// Per-endpoint latency probe timeout, in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Artifacts kept per id in the local tier. `None` or negative keeps all.
    #[serde(default = "default_max_entries")]
    pub max_entries_per_target: Option<i64>,
    /// Archive the targets of symlinks instead of the links themselves.
    #[serde(default = "default_dereference")]
    pub dereference_symlinks: bool,
    /// Octal mode applied to local artifacts, e.g. `"644"`. Unset keeps the
    /// process umask.
    #[serde(default)]
    pub write_permissions: Option<String>,
    /// Object-store connection settings.
    #[serde(default)]
    pub s3: S3Options,
}

fn default_compression_level() -> i64 {
    5
}

fn default_timeout_secs() -> u64 {
    4
}

fn default_probe_timeout_ms() -> u64 {
    500
}

fn default_max_entries() -> Option<i64> {
    Some(8)
}

fn default_dereference() -> bool {
    true
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            compression_level: default_compression_level(),
            read_timeout_secs: default_timeout_secs(),
            write_timeout_secs: default_timeout_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_entries_per_target: default_max_entries(),
            dereference_symlinks: default_dereference(),
            write_permissions: None,
            s3: S3Options::default(),
        }
    }
}

impl TierConfig {
    /// Check the configuration, warning about settings that weaken the cache.
    pub fn validate(&self) -> Result<()> {
        if !(0..=9).contains(&self.compression_level) {
            return Err(Error::InvalidCompressionLevel(self.compression_level));
        }
        if self.is_weak_compression() {
            warn!(
                "compression_level 0 stores artifacts uncompressed; corrupted artifacts \
                 are then much less likely to be detected on extraction"
            );
        }
        if self.read_timeout_secs == 0 || self.write_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "read and write timeouts must be at least one second".into(),
            ));
        }
        self.write_mode()?;
        Ok(())
    }

    /// Level 0 is accepted but stores artifacts uncompressed, which leaves
    /// corruption mostly undetectable.
    pub fn is_weak_compression(&self) -> bool {
        self.compression_level == 0
    }

    /// File mode for local artifacts, parsed from `write_permissions`.
    pub fn write_mode(&self) -> Result<Option<u32>> {
        let Some(raw) = self.write_permissions.as_deref() else {
            return Ok(None);
        };
        let digits = raw.trim().trim_start_matches("0o");
        match u32::from_str_radix(digits, 8) {
            Ok(mode) if mode <= 0o7777 => Ok(Some(mode)),
            _ => Err(Error::InvalidConfig(format!(
                "write_permissions must be an octal file mode, got {:?}",
                raw
            ))),
        }
    }

    /// Compression level as the codec expects it.
    pub fn level(&self) -> u32 {
        self.compression_level.clamp(0, 9) as u32
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries_per_target
            .filter(|n| *n >= 0)
            .map(|n| n as usize)
    }
}

/// Object-store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Options {
    /// Named credentials profile, tried first.
    #[serde(default = "default_profile")]
    pub profile: Option<String>,
    /// Properties file with `accessKey` / `secretKey`, tried second.
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible stores.
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_profile() -> Option<String> {
    Some("artifacts".to_string())
}

fn default_credentials_file() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kiln")
        .join("s3credentials")
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for S3Options {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            credentials_file: default_credentials_file(),
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}
