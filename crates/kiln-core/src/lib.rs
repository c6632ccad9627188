//! Kiln Core
//!
//! Shared vocabulary for the Kiln artifact cache: cache keys, the error
//! taxonomy, fetch outcomes and the port traits every cache tier implements.
//! This crate has minimal dependencies so that a build orchestrator can
//! depend on it without pulling in any transport.

pub mod cache;
pub mod error;
pub mod key;
pub mod ports;

pub use cache::FetchResult;
pub use error::{Error, FailureKind, Result};
pub use key::{ARCHIVE_EXTENSION, CacheKey};
pub use ports::{ArtifactCache, ArtifactStream, LocalTier};
