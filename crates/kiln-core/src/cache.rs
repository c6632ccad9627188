//! Cache outcome types.

/// Result of reading an artifact out of the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// The artifact was found and extracted.
    Hit,
    /// Nothing to reuse. Also reported for transient remote outages.
    Miss,
    /// The artifact exists but could not be read back. Distinct from a miss
    /// so that callers who care about cache integrity can fail loudly.
    Unreadable { key: String, reason: String },
}

impl FetchResult {
    pub fn is_hit(&self) -> bool {
        matches!(self, FetchResult::Hit)
    }

    pub fn is_unreadable(&self) -> bool {
        matches!(self, FetchResult::Unreadable { .. })
    }
}

impl From<bool> for FetchResult {
    fn from(hit: bool) -> Self {
        if hit { FetchResult::Hit } else { FetchResult::Miss }
    }
}
