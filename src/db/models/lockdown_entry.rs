use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Persisted value of a channel lockdown; the channel id is the map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredLockdown {
    /// Absolute expiry in epoch milliseconds
    pub expires_at: i64,
}

/// `channelId -> lockdown`, stored under the guild's `lockdowns` key
pub type LockdownTable = BTreeMap<u64, StoredLockdown>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockdownEntry {
    pub guild_id: u64,
    pub channel_id: u64,
    pub expires_at: i64,
}

impl LockdownEntry {
    pub fn is_active(&self, now_ms: i64) -> bool {
        self.expires_at > now_ms
    }

    pub fn remaining_ms(&self, now_ms: i64) -> u64 {
        (self.expires_at - now_ms).max(0) as u64
    }
}
