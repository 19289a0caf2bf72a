use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cached payload paired with its own expiry instant.
///
/// The shared store never expires the key; `logical_expire_at` is the only freshness signal.
/// Serialized as `{"data": ..., "logicalExpireAt": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEnvelope<V> {
    pub data: V,
    #[serde(rename = "logicalExpireAt")]
    pub logical_expire_at: DateTime<Utc>,
}

impl<V> SnapshotEnvelope<V> {
    /// Wrap `data` so it is fresh until `now + ttl`.
    pub fn new(data: V, now: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let logical_expire_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            data,
            logical_expire_at,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.logical_expire_at > now
    }
}
