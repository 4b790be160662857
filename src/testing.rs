//! In-memory collaborators for unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::bot::error::Error;
use crate::db::store::StateBackend;
use crate::services::platform::{ChatPlatform, MemberRef, OverwriteChange};

/// Key-value backend that yields on every call, so unguarded
/// read-modify-write cycles would interleave.
#[derive(Default)]
pub struct MemoryBackend {
    values: Mutex<BTreeMap<(u64, String), Value>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn raw(&self, guild_id: u64, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap()
            .get(&(guild_id, key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl StateBackend for MemoryBackend {
    async fn get(&self, guild_id: u64, key: &str) -> Result<Option<Value>, Error> {
        tokio::task::yield_now().await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Storage("read failed".to_string()));
        }
        Ok(self.raw(guild_id, key))
    }

    async fn set(&self, guild_id: u64, key: &str, value: Value) -> Result<(), Error> {
        tokio::task::yield_now().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("write failed".to_string()));
        }
        self.values
            .lock()
            .unwrap()
            .insert((guild_id, key.to_string()), value);
        Ok(())
    }

    async fn guilds_with(&self, key: &str) -> Result<Vec<u64>, Error> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Storage("read failed".to_string()));
        }
        Ok(self
            .values
            .lock()
            .unwrap()
            .keys()
            .filter(|(_, k)| k == key)
            .map(|(guild, _)| *guild)
            .collect())
    }
}

/// Platform calls observed by `RecordingPlatform`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    AddRole { user: u64, role: u64 },
    RemoveRole { user: u64, role: u64 },
    DirectMessage { user: u64, text: String },
    ChannelMessage { channel: u64, text: String },
    Overwrite { channel: u64, role: u64, change: OverwriteChange },
    Ban { guild: u64, user: u64 },
    Unban { guild: u64, user: u64 },
    Kick { guild: u64, user: u64 },
}

/// Platform double: every user is a member unless marked absent.
#[derive(Default)]
pub struct RecordingPlatform {
    calls: Mutex<Vec<PlatformCall>>,
    absent: Mutex<HashSet<u64>>,
    unreachable_guilds: Mutex<HashSet<u64>>,
    closed_dms: AtomicBool,
    failing_roles: AtomicBool,
    failing_overwrites: AtomicBool,
    lookup_delay: Mutex<Option<Duration>>,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_absent(&self, user_id: u64) {
        self.absent.lock().unwrap().insert(user_id);
    }

    /// Member lookups in this guild fail with an API error
    pub fn mark_unreachable(&self, guild_id: u64) {
        self.unreachable_guilds.lock().unwrap().insert(guild_id);
    }

    pub fn close_dms(&self) {
        self.closed_dms.store(true, Ordering::SeqCst);
    }

    /// Role changes fail with an API error
    pub fn fail_roles(&self, fail: bool) {
        self.failing_roles.store(fail, Ordering::SeqCst);
    }

    /// Permission overwrite changes fail with an API error
    pub fn fail_overwrites(&self, fail: bool) {
        self.failing_overwrites.store(fail, Ordering::SeqCst);
    }

    /// Member lookups sleep this long before answering
    pub fn delay_lookups(&self, delay: Duration) {
        *self.lookup_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&PlatformCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: PlatformCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChatPlatform for RecordingPlatform {
    async fn find_member(&self, guild_id: u64, user_id: u64) -> Result<Option<MemberRef>, Error> {
        let delay = *self.lookup_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable_guilds.lock().unwrap().contains(&guild_id) {
            return Err(Error::custom("guild unavailable"));
        }
        if self.absent.lock().unwrap().contains(&user_id) {
            return Ok(None);
        }
        Ok(Some(MemberRef { guild_id, user_id }))
    }

    async fn add_role(&self, member: &MemberRef, role_id: u64) -> Result<(), Error> {
        if self.failing_roles.load(Ordering::SeqCst) {
            return Err(Error::custom("missing permissions"));
        }
        self.record(PlatformCall::AddRole {
            user: member.user_id,
            role: role_id,
        });
        Ok(())
    }

    async fn remove_role(&self, member: &MemberRef, role_id: u64) -> Result<(), Error> {
        if self.failing_roles.load(Ordering::SeqCst) {
            return Err(Error::custom("missing permissions"));
        }
        self.record(PlatformCall::RemoveRole {
            user: member.user_id,
            role: role_id,
        });
        Ok(())
    }

    async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<(), Error> {
        if self.closed_dms.load(Ordering::SeqCst) {
            return Err(Error::custom("cannot send messages to this user"));
        }
        self.record(PlatformCall::DirectMessage {
            user: user_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_channel_message(&self, channel_id: u64, text: &str) -> Result<(), Error> {
        self.record(PlatformCall::ChannelMessage {
            channel: channel_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn set_channel_permission_overwrite(
        &self,
        channel_id: u64,
        role_id: u64,
        change: OverwriteChange,
    ) -> Result<(), Error> {
        if self.failing_overwrites.load(Ordering::SeqCst) {
            return Err(Error::custom("missing permissions"));
        }
        self.record(PlatformCall::Overwrite {
            channel: channel_id,
            role: role_id,
            change,
        });
        Ok(())
    }

    async fn ban_member(&self, guild_id: u64, user_id: u64) -> Result<(), Error> {
        self.record(PlatformCall::Ban {
            guild: guild_id,
            user: user_id,
        });
        Ok(())
    }

    async fn unban_member(&self, guild_id: u64, user_id: u64) -> Result<(), Error> {
        self.record(PlatformCall::Unban {
            guild: guild_id,
            user: user_id,
        });
        Ok(())
    }

    async fn kick_member(&self, guild_id: u64, user_id: u64) -> Result<(), Error> {
        self.record(PlatformCall::Kick {
            guild: guild_id,
            user: user_id,
        });
        Ok(())
    }

    async fn guild_name(&self, guild_id: u64) -> Option<String> {
        Some(format!("Guild {}", guild_id))
    }
}
