//! Integration test infrastructure for Kiln.
//!
//! Most tests run against [`ObjectServer`], an in-memory object store
//! served by wiremock that speaks enough of both the S3 path-style API and
//! the plain REST cache protocol. Tests behind the `integration` feature
//! run against a real MinIO container instead.
//!
//! # Usage
//!
//! ```ignore
//! use kiln_tests::{ArtifactWorkspace, ObjectServer};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let server = ObjectServer::start().await;
//!     let workspace = ArtifactWorkspace::new();
//!     // Build a cache from workspace.cache_dir() and server.uri().
//! }
//! ```

pub mod containers;
pub mod context;
pub mod fixtures;
pub mod helpers;

pub use context::MinioContext;
pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,kiln_cache=debug")),
        )
        .with_test_writer()
        .try_init();
}
