use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::services::duration;

/// How long a mute lasts. Stored as `null` (permanent) or milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<u64>", into = "Option<u64>")]
pub enum MuteDuration {
    Permanent,
    Timed(u64),
}

impl From<Option<u64>> for MuteDuration {
    fn from(ms: Option<u64>) -> Self {
        ms.map_or(MuteDuration::Permanent, MuteDuration::Timed)
    }
}

impl From<MuteDuration> for Option<u64> {
    fn from(duration: MuteDuration) -> Self {
        match duration {
            MuteDuration::Permanent => None,
            MuteDuration::Timed(ms) => Some(ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteRecord {
    pub user_id: u64,
    pub guild_id: u64,
    /// Epoch milliseconds
    pub issued_at: i64,
    pub duration: MuteDuration,
    /// Human readable form of the duration as the moderator entered it
    pub descriptor: String,
}

impl MuteRecord {
    pub fn remaining_ms(&self, now_ms: i64) -> Option<u64> {
        match self.duration {
            MuteDuration::Permanent => None,
            MuteDuration::Timed(total) => Some(duration::remaining(total, now_ms - self.issued_at)),
        }
    }

    /// Permanent mutes never expire.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.remaining_ms(now_ms), Some(ms) if ms < 1)
    }
}

/// `userId -> mutes`, stored under the guild's `activeMutes` key
pub type ActiveMuteTable = BTreeMap<u64, Vec<MuteRecord>>;
