//! Cache keys and the remote object layout derived from them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// File extension shared by local artifacts and remote objects.
pub const ARCHIVE_EXTENSION: &str = "tgz";

/// Identifies one cacheable unit of work.
///
/// `id` names the logical artifact (usually a target's stable name) and
/// `hash` fingerprints the inputs that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    id: String,
    hash: String,
}

impl CacheKey {
    pub fn new(id: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hash: hash.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Object path of this key under a remote root prefix.
    ///
    /// Every process sharing a remote cache must agree on this mapping, so it
    /// depends on nothing but the prefix and the key.
    pub fn remote_address(&self, prefix: &str) -> String {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{}/{}.{}", self.hash, self.id, ARCHIVE_EXTENSION)
        } else {
            format!("{}/{}/{}.{}", prefix, self.hash, self.id, ARCHIVE_EXTENSION)
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_remote_address_with_prefix() {
        let key = CacheKey::new("src.java.app", "f00dcafe");
        assert_eq!(key.remote_address("builds/cache"), "builds/cache/f00dcafe/src.java.app.tgz");
    }

    #[test]
    fn test_remote_address_without_prefix() {
        let key = CacheKey::new("app", "abc");
        assert_eq!(key.remote_address(""), "abc/app.tgz");
        assert_eq!(key.remote_address("/"), "abc/app.tgz");
    }

    #[test]
    fn test_remote_address_strips_slashes() {
        let key = CacheKey::new("app", "abc");
        assert_eq!(key.remote_address("/root/"), "root/abc/app.tgz");
    }

    #[test]
    fn test_equality_needs_both_fields() {
        assert_eq!(CacheKey::new("a", "1"), CacheKey::new("a", "1"));
        assert_ne!(CacheKey::new("a", "1"), CacheKey::new("a", "2"));
        assert_ne!(CacheKey::new("a", "1"), CacheKey::new("b", "1"));
    }

    #[test]
    fn test_key_serialization() {
        let key = CacheKey::new("app", "abc");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"id":"app","hash":"abc"}"#);
        assert_eq!(key.to_string(), "app:abc");
    }
}
