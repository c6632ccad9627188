//! Tiered build-artifact cache for Kiln.
//!
//! A [`CacheSpec`] names at most one local cache directory and one remote
//! mirror group (S3 or HTTP). [`CacheFactory`] turns it into a
//! [`ConfiguredCache`]: local only, or a [`TieredCache`] that reads through
//! the local tier into the remote one and writes through both.

pub mod archiver;
pub mod classify;
pub mod config;
pub mod factory;
pub mod keys;
pub mod local;
pub mod remote;
pub mod selector;
pub mod spec;
pub mod stream;
pub mod tiered;

pub use config::{S3Options, TierConfig};
pub use factory::{CacheFactory, CacheOptions, CacheSetup, ConfiguredCache};
pub use keys::{fingerprint, key_for_inputs};
pub use local::LocalArtifactCache;
pub use remote::{HttpStore, RemoteKind, RemoteStore, RemoteTier, S3Store};
pub use selector::{EndpointLatencySample, EndpointSelector, HttpPinger, Pinger};
pub use spec::{CacheSpec, RemoteSpec};
pub use tiered::TieredCache;
