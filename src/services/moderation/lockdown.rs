use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, error, info};

use crate::bot::error::Error;
use crate::constants::permissions::LOCKDOWN_DENY;
use crate::constants::timeouts::{LOCKDOWN_EVENT_CAPACITY, LOCKDOWN_RETRY_MS};
use crate::db::models::{LockdownEntry, LockdownTable, StoredLockdown};
use crate::db::store::{StateKey, Store};
use crate::services::clock::Clock;
use crate::services::duration::{self, DurationError};
use crate::services::platform::{ChatPlatform, OverwriteChange};

/// Published when a lockdown runs out on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockdownExpired {
    pub guild_id: u64,
    pub channel_id: u64,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub rearmed: usize,
    pub expired: usize,
}

struct ArmedTimer {
    id: u64,
    handle: AbortHandle,
}

/// Channel lockdowns with absolute expiry and in-process timers.
///
/// Timers are only armed, cancelled or acted on while holding the guild's
/// `lockdowns` key, and a fired timer checks that it is still the channel's
/// current timer before touching anything.
#[derive(Clone)]
pub struct LockdownManager {
    store: Store,
    platform: Arc<dyn ChatPlatform>,
    clock: Arc<dyn Clock>,
    timers: Arc<DashMap<u64, ArmedTimer>>,
    next_timer_id: Arc<AtomicU64>,
    events: broadcast::Sender<LockdownExpired>,
}

impl LockdownManager {
    pub fn new(store: Store, platform: Arc<dyn ChatPlatform>, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(LOCKDOWN_EVENT_CAPACITY);
        Self {
            store,
            platform,
            clock,
            timers: Arc::new(DashMap::new()),
            next_timer_id: Arc::new(AtomicU64::new(1)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LockdownExpired> {
        self.events.subscribe()
    }

    /// Lock the channel down for `duration_ms`, replacing any running lockdown.
    pub async fn set(&self, guild_id: u64, channel_id: u64, duration_ms: u64) -> Result<LockdownEntry, Error> {
        self.store
            .run_exclusive(guild_id, StateKey::Lockdowns, || async {
                let expires_at = i64::try_from(duration_ms)
                    .ok()
                    .filter(|&ms| ms as u64 <= duration::MAX_MS)
                    .and_then(|ms| self.clock.now_ms().checked_add(ms))
                    .ok_or_else(|| DurationError::TooLong(duration::format(duration_ms)))?;
                let mut table = self.load(guild_id).await?;

                self.platform
                    .set_channel_permission_overwrite(
                        channel_id,
                        guild_id,
                        OverwriteChange::deny(LOCKDOWN_DENY),
                    )
                    .await?;

                let replaced = table
                    .insert(channel_id, StoredLockdown { expires_at })
                    .is_some();
                if let Err(e) = self.store.set(guild_id, StateKey::Lockdowns, &table).await {
                    // A running lockdown keeps its entry and timer; a new
                    // one must not leave the channel denied.
                    if !replaced {
                        self.lift_overwrite(guild_id, channel_id).await;
                    }
                    return Err(e);
                }

                self.cancel_timer(channel_id);
                self.arm(guild_id, channel_id, duration_ms);

                info!(
                    "Locked down channel {} in guild {} until {}{}",
                    channel_id,
                    guild_id,
                    expires_at,
                    if replaced { " (restarted)" } else { "" }
                );
                Ok(LockdownEntry {
                    guild_id,
                    channel_id,
                    expires_at,
                })
            })
            .await
    }

    /// Lift the lockdown now. Returns false if the channel was not locked down.
    pub async fn remove(&self, guild_id: u64, channel_id: u64) -> Result<bool, Error> {
        self.store
            .run_exclusive(guild_id, StateKey::Lockdowns, || async {
                let removed = self.remove_entry(guild_id, channel_id).await?;
                self.cancel_timer(channel_id);

                if removed.is_some() && self.lift_overwrite(guild_id, channel_id).await {
                    info!("Removed lockdown on channel {} in guild {}", channel_id, guild_id);
                }
                Ok(removed.is_some())
            })
            .await
    }

    pub async fn entry(&self, guild_id: u64, channel_id: u64) -> Result<Option<LockdownEntry>, Error> {
        let table = self.load(guild_id).await?;
        Ok(table.get(&channel_id).map(|stored| LockdownEntry {
            guild_id,
            channel_id,
            expires_at: stored.expires_at,
        }))
    }

    pub async fn is_locked_down(&self, guild_id: u64, channel_id: u64) -> Result<bool, Error> {
        let now = self.clock.now_ms();
        Ok(self
            .entry(guild_id, channel_id)
            .await?
            .is_some_and(|e| e.is_active(now)))
    }

    /// Milliseconds until the lockdown ends, zero when not locked down
    pub async fn get_remaining(&self, guild_id: u64, channel_id: u64) -> Result<u64, Error> {
        let now = self.clock.now_ms();
        Ok(self
            .entry(guild_id, channel_id)
            .await?
            .map_or(0, |e| e.remaining_ms(now)))
    }

    /// Rebuild timers from persisted lockdowns; run once at startup.
    pub async fn restore(&self) -> Result<RestoreReport, Error> {
        let mut report = RestoreReport::default();

        for guild_id in self.store.guilds_with(StateKey::Lockdowns).await? {
            let result = self
                .store
                .run_exclusive(guild_id, StateKey::Lockdowns, || async {
                    let now = self.clock.now_ms();
                    let mut table = self.load(guild_id).await?;

                    let (expired, active): (Vec<_>, Vec<_>) = table
                        .iter()
                        .map(|(&channel_id, stored)| (channel_id, stored.expires_at))
                        .partition(|&(_, expires_at)| expires_at <= now);

                    for &(channel_id, expires_at) in &active {
                        self.cancel_timer(channel_id);
                        self.arm(guild_id, channel_id, (expires_at - now) as u64);
                    }

                    if !expired.is_empty() {
                        for (channel_id, _) in &expired {
                            table.remove(channel_id);
                        }
                        self.store
                            .set(guild_id, StateKey::Lockdowns, &table)
                            .await?;

                        for &(channel_id, expires_at) in &expired {
                            if self.lift_overwrite(guild_id, channel_id).await {
                                self.publish(guild_id, channel_id, expires_at);
                            }
                        }
                    }

                    Ok((active.len(), expired.len()))
                })
                .await;

            match result {
                Ok((rearmed, expired)) => {
                    report.rearmed += rearmed;
                    report.expired += expired;
                }
                Err(e) => error!("Failed to restore lockdowns for guild {}: {:?}", guild_id, e),
            }
        }

        info!(
            "Restored lockdowns: {} re-armed, {} expired while offline",
            report.rearmed, report.expired
        );
        Ok(report)
    }

    async fn load(&self, guild_id: u64) -> Result<LockdownTable, Error> {
        Ok(self
            .store
            .get(guild_id, StateKey::Lockdowns)
            .await?
            .unwrap_or_default())
    }

    /// Delete the persisted entry. Caller holds the `lockdowns` key.
    async fn remove_entry(&self, guild_id: u64, channel_id: u64) -> Result<Option<StoredLockdown>, Error> {
        let mut table = self.load(guild_id).await?;
        let removed = table.remove(&channel_id);
        if removed.is_some() {
            self.store
                .set(guild_id, StateKey::Lockdowns, &table)
                .await?;
        }
        Ok(removed)
    }

    /// Caller holds the `lockdowns` key.
    fn arm(&self, guild_id: u64, channel_id: u64, delay_ms: u64) {
        let id = self.next_timer_id.fetch_add(1, Ordering::Relaxed);
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            manager.on_timer_fired(guild_id, channel_id, id).await;
        });

        self.timers.insert(
            channel_id,
            ArmedTimer {
                id,
                handle: handle.abort_handle(),
            },
        );
        debug!("Armed lockdown timer {} for channel {} ({} ms)", id, channel_id, delay_ms);
    }

    /// Caller holds the `lockdowns` key.
    fn cancel_timer(&self, channel_id: u64) {
        if let Some((_, timer)) = self.timers.remove(&channel_id) {
            timer.handle.abort();
            debug!("Cancelled lockdown timer {} for channel {}", timer.id, channel_id);
        }
    }

    async fn on_timer_fired(&self, guild_id: u64, channel_id: u64, timer_id: u64) {
        let result = self
            .store
            .run_exclusive(guild_id, StateKey::Lockdowns, || async {
                let current = self.timers.get(&channel_id).map(|t| t.id);
                if current != Some(timer_id) {
                    debug!("Lockdown timer {} for channel {} was superseded", timer_id, channel_id);
                    return Ok(None);
                }

                match self.remove_entry(guild_id, channel_id).await {
                    Ok(removed) => {
                        // Drop our own handle without aborting the running task
                        self.timers.remove(&channel_id);
                        match removed {
                            Some(stored) if self.lift_overwrite(guild_id, channel_id).await => {
                                Ok(Some(stored))
                            }
                            _ => Ok(None),
                        }
                    }
                    Err(e) => {
                        error!(
                            "Failed to expire lockdown on channel {}, retrying in {} ms: {:?}",
                            channel_id, LOCKDOWN_RETRY_MS, e
                        );
                        self.arm(guild_id, channel_id, LOCKDOWN_RETRY_MS);
                        Ok(None)
                    }
                }
            })
            .await;

        match result {
            Ok(Some(stored)) => {
                info!("Lockdown on channel {} in guild {} expired", channel_id, guild_id);
                self.publish(guild_id, channel_id, stored.expires_at);
            }
            Ok(None) => {}
            Err(e) => error!("Lockdown timer for channel {} failed: {:?}", channel_id, e),
        }
    }

    /// Reset the lockdown deny. Returns false if the channel stays locked.
    async fn lift_overwrite(&self, guild_id: u64, channel_id: u64) -> bool {
        match self
            .platform
            .set_channel_permission_overwrite(channel_id, guild_id, OverwriteChange::reset(LOCKDOWN_DENY))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Failed to restore permissions on channel {} in guild {}, it is still locked: {:?}",
                    channel_id, guild_id, e
                );
                false
            }
        }
    }

    fn publish(&self, guild_id: u64, channel_id: u64, expires_at: i64) {
        // Nobody listening is fine
        let _ = self.events.send(LockdownExpired {
            guild_id,
            channel_id,
            expires_at,
        });
    }
}
