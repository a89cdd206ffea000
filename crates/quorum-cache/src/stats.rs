use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot of cache effectiveness, for the admin monitoring endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate_percent: f64,
    pub entries: BTreeMap<String, EntryStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryStats {
    pub age_seconds: f64,
    pub cached_at: DateTime<Utc>,
}
