//! Error types for Kiln.

use std::fmt;
use thiserror::Error;

/// How a remote failure should be treated by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The object does not exist. Expected on every cold cache.
    NotFound,
    /// Connectivity trouble: refused, reset, timed out, pool exhausted.
    Network,
    /// Anything else: permissions, malformed responses, corrupt payloads.
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::NotFound => "not found",
            FailureKind::Network => "network",
            FailureKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors
    #[error("Cache spec is empty: at least one local or remote entry is required")]
    CacheSpecEmpty,

    #[error("Too many local cache specs: expected at most 1, got {0}")]
    TooManyLocalSpecs(usize),

    #[error("Too many remote cache specs: expected at most 1, got {0}")]
    TooManyRemoteSpecs(usize),

    #[error("Invalid cache spec {token:?}: {reason}")]
    CacheSpecFormat { token: String, reason: String },

    #[error("compression_level must be an integer 0-9: {0}")]
    InvalidCompressionLevel(i64),

    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    // Runtime cache errors
    #[error("Nonfatal cache error for {key} ({kind}): {message}")]
    NonfatalCache {
        key: String,
        kind: FailureKind,
        message: String,
    },

    #[error("Remote {kind} failure: {message}")]
    Remote { kind: FailureKind, message: String },

    #[error("Artifact path {0} is outside the artifact root")]
    OutsideArtifactRoot(String),

    #[error("Archive error: {0}")]
    Archive(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a classified remote failure.
    pub fn remote(kind: FailureKind, message: impl Into<String>) -> Self {
        Error::Remote {
            kind,
            message: message.into(),
        }
    }

    /// Whether this error comes from a malformed configuration. These abort
    /// startup; everything else is contained by the cache at runtime.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::CacheSpecEmpty
                | Error::TooManyLocalSpecs(_)
                | Error::TooManyRemoteSpecs(_)
                | Error::CacheSpecFormat { .. }
                | Error::InvalidCompressionLevel(_)
                | Error::InvalidConfig(_)
        )
    }

    /// Shorthand for a spec token rejection.
    pub fn spec_format(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::CacheSpecFormat {
            token: token.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_flagged() {
        assert!(Error::CacheSpecEmpty.is_configuration());
        assert!(Error::TooManyRemoteSpecs(2).is_configuration());
        assert!(Error::InvalidCompressionLevel(12).is_configuration());
        assert!(Error::spec_format("foo", "relative path").is_configuration());
        assert!(!Error::remote(FailureKind::Network, "refused").is_configuration());
        assert!(!Error::Archive("bad gzip header".into()).is_configuration());
    }

    #[test]
    fn test_spec_format_names_token() {
        let err = Error::spec_format("../foo", "local cache path must be absolute");
        assert_eq!(
            err.to_string(),
            "Invalid cache spec \"../foo\": local cache path must be absolute"
        );
    }
}
