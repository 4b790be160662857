use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::bot::error::Error;
use crate::db::models::{ActiveMuteTable, GuildSettings, MuteRecord};
use crate::db::store::{StateKey, Store};
use crate::services::clock::Clock;
use crate::services::platform::ChatPlatform;

/// Why a mute is being reversed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteEnd {
    Expired,
    Lifted,
}

/// Result of reversing a mute on the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reversal {
    RoleRemoved,
    /// The user left the guild; only the stored state was cleared
    MemberGone,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Records removed because they expired
    pub expired: usize,
    /// Expired records whose role could not be removed
    pub unreversed: usize,
    /// Guilds whose table could not be read or written
    pub failed_guilds: usize,
}

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the `activeMutes` table and lifts mutes once they run out.
#[derive(Clone)]
pub struct MuteScheduler {
    store: Store,
    platform: Arc<dyn ChatPlatform>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    running: Arc<Mutex<Option<RunningLoop>>>,
}

impl MuteScheduler {
    pub fn new(
        store: Store,
        platform: Arc<dyn ChatPlatform>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            platform,
            clock,
            interval,
            running: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn the recurring reconciliation loop. No-op if already running.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // A started tick always runs to completion before
                        // shutdown is observed.
                        if let Err(e) = scheduler.tick().await {
                            error!("Mute expiry tick failed: {:?}", e);
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            info!("Mute expiry scheduler stopped");
        });

        info!("Started mute expiry scheduler (every {:?})", self.interval);
        *running = Some(RunningLoop { shutdown, handle });
    }

    /// Stop the loop, waiting for an in-flight tick to finish.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            error!("Mute expiry scheduler task failed: {:?}", e);
        }
    }

    /// One reconciliation pass over every guild with active mutes.
    pub async fn tick(&self) -> Result<TickReport, Error> {
        let now = self.clock.now_ms();
        let guilds = self.store.guilds_with(StateKey::ActiveMutes).await?;

        let mut report = TickReport::default();
        for guild_id in guilds {
            match self.reconcile_guild(guild_id, now).await {
                Ok((expired, unreversed)) => {
                    report.expired += expired;
                    report.unreversed += unreversed;
                }
                Err(e) => {
                    error!("Failed to reconcile mutes for guild {}: {:?}", guild_id, e);
                    report.failed_guilds += 1;
                }
            }
        }

        if report.expired > 0 || report.failed_guilds > 0 {
            debug!("Mute tick: {:?}", report);
        }
        Ok(report)
    }

    async fn reconcile_guild(&self, guild_id: u64, now: i64) -> Result<(usize, usize), Error> {
        self.store
            .run_exclusive(guild_id, StateKey::ActiveMutes, || async {
                let Some(mut table) = self
                    .store
                    .get::<ActiveMuteTable>(guild_id, StateKey::ActiveMutes)
                    .await?
                else {
                    return Ok((0, 0));
                };

                let settings: GuildSettings = self
                    .store
                    .get(guild_id, StateKey::Settings)
                    .await?
                    .unwrap_or_default();

                let mut changed = false;
                let mut expired = 0;
                let mut unreversed = 0;

                for (&user_id, mutes) in table.iter_mut() {
                    let (gone, active): (Vec<_>, Vec<_>) =
                        mutes.drain(..).partition(|m| m.is_expired(now));
                    *mutes = active;
                    if gone.is_empty() {
                        continue;
                    }

                    info!(
                        "Removing {} expired mute(s) for user {} in guild {}",
                        gone.len(),
                        user_id,
                        guild_id
                    );
                    expired += gone.len();
                    changed = true;

                    // Another mute is still running; the role has to stay.
                    if !mutes.is_empty() {
                        continue;
                    }

                    // The record goes either way
                    if let Err(e) = self
                        .reverse_mute(guild_id, user_id, settings.muted_role, MuteEnd::Expired)
                        .await
                    {
                        warn!(
                            "Could not lift expired mute for user {} in guild {}: {}",
                            user_id, guild_id, e
                        );
                        unreversed += gone.len();
                    }
                }

                let users = table.len();
                table.retain(|_, mutes| !mutes.is_empty());
                changed |= table.len() != users;

                if changed {
                    self.store
                        .set(guild_id, StateKey::ActiveMutes, &table)
                        .await?;
                }
                Ok((expired, unreversed))
            })
            .await
    }

    /// Remove the muted role and tell the user. Shared by expiry and unmute.
    ///
    /// A member who left the guild is not an error. Failing to resolve the
    /// member or role is reported to the caller.
    async fn reverse_mute(
        &self,
        guild_id: u64,
        user_id: u64,
        muted_role: Option<u64>,
        end: MuteEnd,
    ) -> Result<Reversal, Error> {
        let Some(member) = self.platform.find_member(guild_id, user_id).await? else {
            debug!("User {} is no longer in guild {}", user_id, guild_id);
            return Ok(Reversal::MemberGone);
        };

        let role = muted_role.ok_or_else(|| Error::NotConfigured("muted role".to_string()))?;
        self.platform.remove_role(&member, role).await?;

        let guild_name = self
            .platform
            .guild_name(guild_id)
            .await
            .unwrap_or_else(|| "the server".to_string());
        let text = match end {
            MuteEnd::Expired => format!(
                "Your mute on {} has expired. You may now send messages.",
                guild_name
            ),
            MuteEnd::Lifted => format!(
                "You have been unmuted on {}. You may now send messages.",
                guild_name
            ),
        };

        if let Err(e) = self.platform.send_direct_message(user_id, &text).await {
            debug!("Could not DM user {} about unmute: {:?}", user_id, e);
        }

        Ok(Reversal::RoleRemoved)
    }

    /// Store a new mute for the user
    pub async fn insert(&self, record: MuteRecord) -> Result<(), Error> {
        let guild_id = record.guild_id;
        self.store
            .run_exclusive(guild_id, StateKey::ActiveMutes, || async {
                let mut table: ActiveMuteTable = self
                    .store
                    .get(guild_id, StateKey::ActiveMutes)
                    .await?
                    .unwrap_or_default();
                table.entry(record.user_id).or_default().push(record);
                self.store.set(guild_id, StateKey::ActiveMutes, &table).await
            })
            .await
    }

    /// Remove one stored mute. Undoes an `insert` whose sanction failed.
    pub async fn discard(&self, record: &MuteRecord) -> Result<bool, Error> {
        let guild_id = record.guild_id;
        self.store
            .run_exclusive(guild_id, StateKey::ActiveMutes, || async {
                let mut table: ActiveMuteTable = self
                    .store
                    .get(guild_id, StateKey::ActiveMutes)
                    .await?
                    .unwrap_or_default();

                let Some(mutes) = table.get_mut(&record.user_id) else {
                    return Ok(false);
                };
                let Some(pos) = mutes.iter().position(|m| m == record) else {
                    return Ok(false);
                };
                mutes.remove(pos);
                if mutes.is_empty() {
                    table.remove(&record.user_id);
                }

                self.store
                    .set(guild_id, StateKey::ActiveMutes, &table)
                    .await?;
                Ok(true)
            })
            .await
    }

    /// Drop every mute of the user, then reverse it on the platform.
    ///
    /// Returns the removed records. The role is removed even when nothing
    /// was stored, which clears a manually applied role.
    pub async fn lift(&self, guild_id: u64, user_id: u64) -> Result<(Vec<MuteRecord>, Reversal), Error> {
        self.store
            .run_exclusive(guild_id, StateKey::ActiveMutes, || async {
                let settings: GuildSettings = self
                    .store
                    .get(guild_id, StateKey::Settings)
                    .await?
                    .unwrap_or_default();

                let mut table: ActiveMuteTable = self
                    .store
                    .get(guild_id, StateKey::ActiveMutes)
                    .await?
                    .unwrap_or_default();
                let removed = table.remove(&user_id).unwrap_or_default();
                if !removed.is_empty() {
                    self.store
                        .set(guild_id, StateKey::ActiveMutes, &table)
                        .await?;
                }

                let reversal = self
                    .reverse_mute(guild_id, user_id, settings.muted_role, MuteEnd::Lifted)
                    .await?;
                Ok((removed, reversal))
            })
            .await
    }

    pub async fn active_mutes(&self, guild_id: u64, user_id: u64) -> Result<Vec<MuteRecord>, Error> {
        let table: Option<ActiveMuteTable> = self.store.get(guild_id, StateKey::ActiveMutes).await?;
        Ok(table
            .and_then(|mut t| t.remove(&user_id))
            .unwrap_or_default())
    }
}
