//! Remote failure classification.
//!
//! Every transport error is mapped to a [`FailureKind`] at the transport
//! boundary, and every remote operation reports failures through
//! [`log_and_classify`]. Misses stay quiet; outages and bugs get one warning.
//!
//! Checksum and decode failures are treated as [`FailureKind::Unknown`]: a
//! payload that arrives but does not verify points at corruption, which
//! should surface as an unreadable artifact rather than be mistaken for a
//! flaky connection.

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use kiln_core::{CacheKey, Error, FailureKind};
use std::error::Error as StdError;
use std::io;
use tracing::{debug, warn};

/// Classify an error surfaced by any tier.
pub fn failure_kind(err: &Error) -> FailureKind {
    match err {
        Error::Remote { kind, .. } | Error::NonfatalCache { kind, .. } => *kind,
        Error::Io(e) => io_kind(e),
        _ => FailureKind::Unknown,
    }
}

/// Log a remote failure at the level its kind deserves and return the kind.
pub fn log_and_classify(err: &Error, verb: &str, key: &CacheKey) -> FailureKind {
    let kind = failure_kind(err);
    match kind {
        FailureKind::NotFound => {
            debug!(verb, key = %key, "Not found in remote cache");
        }
        FailureKind::Network => {
            warn!(verb, key = %key, error = %err, "Remote cache unreachable");
        }
        FailureKind::Unknown => {
            warn!(verb, key = %key, error = %err, "Remote cache request failed");
        }
    }
    kind
}

/// Connection-shaped io errors are network failures; nothing else is.
pub fn io_kind(err: &io::Error) -> FailureKind {
    use io::ErrorKind::*;
    match err.kind() {
        ConnectionRefused | ConnectionReset | ConnectionAborted | NotConnected | BrokenPipe
        | TimedOut | UnexpectedEof | AddrNotAvailable | HostUnreachable | NetworkUnreachable
        | NetworkDown => FailureKind::Network,
        _ => FailureKind::Unknown,
    }
}

/// Walk an error's source chain looking for a network-shaped io error.
pub fn source_chain_kind(err: &(dyn StdError + 'static)) -> FailureKind {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>()
            && io_kind(io_err) == FailureKind::Network
        {
            return FailureKind::Network;
        }
        current = e.source();
    }
    FailureKind::Unknown
}

/// Map an S3 SDK error.
pub fn classify_s3<E>(err: SdkError<E, HttpResponse>) -> Error
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
{
    let kind = match &err {
        SdkError::TimeoutError(_) => FailureKind::Network,
        SdkError::DispatchFailure(failure) if failure.is_io() || failure.is_timeout() => {
            FailureKind::Network
        }
        SdkError::ServiceError(ctx) => {
            let status = ctx.raw().status().as_u16();
            match ctx.err().code() {
                Some("NoSuchKey") | Some("NotFound") => FailureKind::NotFound,
                _ if status == 404 => FailureKind::NotFound,
                _ => FailureKind::Unknown,
            }
        }
        other => source_chain_kind(other),
    };
    Error::remote(kind, DisplayErrorContext(&err).to_string())
}

/// Map an error raised while streaming an S3 object body.
pub fn classify_s3_body(err: aws_sdk_s3::primitives::ByteStreamError) -> Error {
    let kind = source_chain_kind(&err);
    Error::remote(kind, format!("Failed to read object body: {}", err))
}

/// Map a reqwest transport error.
pub fn classify_reqwest(err: reqwest::Error) -> Error {
    let kind = if err.is_timeout() || err.is_connect() {
        FailureKind::Network
    } else if err.status() == Some(reqwest::StatusCode::NOT_FOUND) {
        FailureKind::NotFound
    } else {
        source_chain_kind(&err)
    };
    Error::remote(kind, err.to_string())
}

/// Map an unsuccessful HTTP status.
pub fn classify_status(status: reqwest::StatusCode, verb: &str, url: &str) -> Error {
    let kind = if status == reqwest::StatusCode::NOT_FOUND {
        FailureKind::NotFound
    } else {
        FailureKind::Unknown
    };
    Error::remote(kind, format!("{} {} returned {}", verb, url, status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_kinds() {
        for kind in [
            io::ErrorKind::ConnectionRefused,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::TimedOut,
            io::ErrorKind::UnexpectedEof,
        ] {
            assert_eq!(io_kind(&io::Error::from(kind)), FailureKind::Network);
        }
        for kind in [
            io::ErrorKind::PermissionDenied,
            io::ErrorKind::NotFound,
            io::ErrorKind::InvalidData,
        ] {
            assert_eq!(io_kind(&io::Error::from(kind)), FailureKind::Unknown);
        }
    }

    #[test]
    fn test_failure_kind_of_cache_errors() {
        assert_eq!(
            failure_kind(&Error::remote(FailureKind::NotFound, "404")),
            FailureKind::NotFound
        );
        assert_eq!(
            failure_kind(&Error::Io(io::Error::from(io::ErrorKind::ConnectionReset))),
            FailureKind::Network
        );
        assert_eq!(
            failure_kind(&Error::Archive("invalid gzip header".into())),
            FailureKind::Unknown
        );
    }

    #[derive(Debug)]
    struct Wrapper(io::Error);

    impl std::fmt::Display for Wrapper {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "transport failed")
        }
    }

    impl StdError for Wrapper {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_source_chain_finds_nested_io_error() {
        let nested = Wrapper(io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(source_chain_kind(&nested), FailureKind::Network);

        let nested = Wrapper(io::Error::other("checksum mismatch"));
        assert_eq!(source_chain_kind(&nested), FailureKind::Unknown);
    }

    #[test]
    fn test_status_classification() {
        let err = classify_status(reqwest::StatusCode::NOT_FOUND, "GET", "http://cache/a.tgz");
        assert_eq!(failure_kind(&err), FailureKind::NotFound);
        let err = classify_status(reqwest::StatusCode::FORBIDDEN, "GET", "http://cache/a.tgz");
        assert_eq!(failure_kind(&err), FailureKind::Unknown);
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn test_log_and_classify_returns_kind() {
        let key = CacheKey::new("app", "abc");
        let err = Error::remote(FailureKind::Network, "connection refused");
        assert_eq!(log_and_classify(&err, "GET", &key), FailureKind::Network);
    }
}
