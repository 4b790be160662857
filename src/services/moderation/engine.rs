use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bot::error::Error;
use crate::constants::permissions::MUTED_DENY;
use crate::db::models::{ActionType, GuildSettings, MuteDuration, MuteRecord};
use crate::db::store::{StateKey, Store};
use crate::services::clock::Clock;
use crate::services::moderation::lockdown::{LockdownManager, RestoreReport};
use crate::services::moderation::mute_scheduler::{MuteScheduler, Reversal};
use crate::services::moderation::recorder::ActionRecorder;
use crate::services::platform::{ChatPlatform, OverwriteChange};
use crate::utils::formatting::{case_message, CaseEntry};

/// Result of an unmute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unmuted {
    pub removed: Vec<MuteRecord>,
    pub reversal: Reversal,
}

/// Public moderation API used by the slash commands
#[derive(Clone)]
pub struct ModerationEngine {
    store: Store,
    platform: Arc<dyn ChatPlatform>,
    clock: Arc<dyn Clock>,
    recorder: ActionRecorder,
    scheduler: MuteScheduler,
    lockdown: LockdownManager,
}

impl ModerationEngine {
    pub fn new(
        store: Store,
        platform: Arc<dyn ChatPlatform>,
        clock: Arc<dyn Clock>,
        mute_check_interval: Duration,
    ) -> Self {
        Self {
            recorder: ActionRecorder::new(store.clone()),
            scheduler: MuteScheduler::new(
                store.clone(),
                platform.clone(),
                clock.clone(),
                mute_check_interval,
            ),
            lockdown: LockdownManager::new(store.clone(), platform.clone(), clock.clone()),
            store,
            platform,
            clock,
        }
    }

    pub fn recorder(&self) -> &ActionRecorder {
        &self.recorder
    }

    pub fn scheduler(&self) -> &MuteScheduler {
        &self.scheduler
    }

    pub fn lockdown(&self) -> &LockdownManager {
        &self.lockdown
    }

    /// Restore lockdown timers and start the mute scheduler
    pub async fn start(&self) -> Result<RestoreReport, Error> {
        let report = self.lockdown.restore().await?;
        self.scheduler.start().await;
        Ok(report)
    }

    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
    }

    pub async fn settings(&self, guild_id: u64) -> Result<GuildSettings, Error> {
        Ok(self
            .store
            .get(guild_id, StateKey::Settings)
            .await?
            .unwrap_or_default())
    }

    pub async fn update_settings(
        &self,
        guild_id: u64,
        update: impl FnOnce(&mut GuildSettings),
    ) -> Result<GuildSettings, Error> {
        self.store
            .run_exclusive(guild_id, StateKey::Settings, || async {
                let mut settings = self.settings(guild_id).await?;
                update(&mut settings);
                self.store
                    .set(guild_id, StateKey::Settings, &settings)
                    .await?;
                Ok(settings)
            })
            .await
    }

    async fn muted_role(&self, guild_id: u64) -> Result<u64, Error> {
        self.settings(guild_id)
            .await?
            .muted_role
            .ok_or_else(|| Error::NotConfigured("muted role (use /modconfig muted-role)".to_string()))
    }

    /// Returns the user's warning count
    pub async fn warn(&self, guild_id: u64, user_id: u64) -> Result<u64, Error> {
        let count = self
            .recorder
            .count(guild_id, user_id, ActionType::Warning)
            .await?;
        info!("Warned user {} in guild {} ({} total)", user_id, guild_id, count);
        Ok(count)
    }

    pub async fn mute(
        &self,
        guild_id: u64,
        user_id: u64,
        duration: MuteDuration,
        descriptor: &str,
    ) -> Result<MuteRecord, Error> {
        let role = self.muted_role(guild_id).await?;
        let member = self
            .platform
            .find_member(guild_id, user_id)
            .await?
            .ok_or(Error::MemberNotFound {
                guild: guild_id,
                user: user_id,
            })?;

        let record = MuteRecord {
            user_id,
            guild_id,
            issued_at: self.clock.now_ms(),
            duration,
            descriptor: descriptor.to_string(),
        };

        // Stored state first, so a failure never leaves an untracked role
        self.scheduler.insert(record.clone()).await?;
        let applied = match self.recorder.count(guild_id, user_id, ActionType::Mute).await {
            Ok(_) => self.platform.add_role(&member, role).await,
            Err(e) => Err(e),
        };
        if let Err(e) = applied {
            if let Err(undo) = self.scheduler.discard(&record).await {
                warn!(
                    "Failed to discard mute record for user {} in guild {}: {:?}",
                    user_id, guild_id, undo
                );
            }
            return Err(e);
        }

        info!(
            "Muted user {} in guild {} ({:?})",
            user_id, guild_id, duration
        );
        Ok(record)
    }

    pub async fn unmute(&self, guild_id: u64, user_id: u64) -> Result<Unmuted, Error> {
        let (removed, reversal) = self.scheduler.lift(guild_id, user_id).await?;
        info!(
            "Unmuted user {} in guild {} ({} stored mute(s) cleared)",
            user_id,
            guild_id,
            removed.len()
        );
        Ok(Unmuted { removed, reversal })
    }

    pub async fn kick(&self, guild_id: u64, user_id: u64) -> Result<(), Error> {
        self.recorder
            .count(guild_id, user_id, ActionType::Kick)
            .await?;
        self.platform.kick_member(guild_id, user_id).await?;
        info!("Kicked user {} from guild {}", user_id, guild_id);
        Ok(())
    }

    pub async fn ban(&self, guild_id: u64, user_id: u64) -> Result<(), Error> {
        self.recorder
            .count(guild_id, user_id, ActionType::Ban)
            .await?;
        self.platform.ban_member(guild_id, user_id).await?;
        info!("Banned user {} from guild {}", user_id, guild_id);
        Ok(())
    }

    pub async fn unban(&self, guild_id: u64, user_id: u64) -> Result<(), Error> {
        self.platform.unban_member(guild_id, user_id).await?;
        info!("Unbanned user {} from guild {}", user_id, guild_id);
        Ok(())
    }

    /// Ban and immediately unban to purge recent messages. Counts as a kick.
    pub async fn soft_ban(&self, guild_id: u64, user_id: u64) -> Result<(), Error> {
        self.recorder
            .count(guild_id, user_id, ActionType::Kick)
            .await?;
        self.platform.ban_member(guild_id, user_id).await?;
        self.platform.unban_member(guild_id, user_id).await?;
        info!("Softbanned user {} from guild {}", user_id, guild_id);
        Ok(())
    }

    /// Take a case number and post the case to the mod-log channel, if any
    pub async fn log_case(&self, guild_id: u64, entry: &CaseEntry) -> Result<u64, Error> {
        let case = self.recorder.next_case(guild_id).await?;

        match self.settings(guild_id).await?.mod_log_channel {
            Some(channel_id) => {
                if let Err(e) = self
                    .platform
                    .send_channel_message(channel_id, &case_message(case, entry))
                    .await
                {
                    warn!("Failed to post case {} for guild {}: {:?}", case, guild_id, e);
                }
            }
            None => debug!("No mod-log channel for guild {}, case {} not posted", guild_id, case),
        }

        Ok(case)
    }

    /// Deny the muted role's communication permissions on a channel.
    /// Returns false when the guild has no muted role configured.
    pub async fn apply_muted_overwrites(&self, guild_id: u64, channel_id: u64) -> Result<bool, Error> {
        let Some(role) = self.settings(guild_id).await?.muted_role else {
            return Ok(false);
        };

        self.platform
            .set_channel_permission_overwrite(channel_id, role, OverwriteChange::deny(MUTED_DENY))
            .await?;
        debug!("Applied muted role overwrites on channel {}", channel_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ActiveMuteTable;
    use crate::services::clock::TokioClock;
    use crate::testing::{MemoryBackend, PlatformCall, RecordingPlatform};
    use crate::utils::formatting::CaseKind;

    const GUILD: u64 = 7;
    const USER: u64 = 42;
    const MUTED_ROLE: u64 = 99;
    const MOD_LOG: u64 = 500;

    async fn engine(configured: bool) -> (ModerationEngine, Arc<RecordingPlatform>) {
        let platform = Arc::new(RecordingPlatform::new());
        let engine = ModerationEngine::new(
            Store::new(Arc::new(MemoryBackend::new())),
            platform.clone(),
            Arc::new(TokioClock::starting_at(0)),
            Duration::from_secs(60),
        );
        if configured {
            engine
                .update_settings(GUILD, |s| {
                    s.muted_role = Some(MUTED_ROLE);
                    s.mod_log_channel = Some(MOD_LOG);
                })
                .await
                .unwrap();
        }
        (engine, platform)
    }

    #[tokio::test(start_paused = true)]
    async fn test_mute_then_expire() {
        let (engine, platform) = engine(true).await;

        let record = engine
            .mute(GUILD, USER, MuteDuration::Timed(1_000), "1s")
            .await
            .unwrap();
        assert_eq!(record.issued_at, 0);
        assert_eq!(engine.scheduler().active_mutes(GUILD, USER).await.unwrap().len(), 1);
        assert!(platform.calls().contains(&PlatformCall::AddRole {
            user: USER,
            role: MUTED_ROLE,
        }));
        assert_eq!(engine.recorder().get_count(GUILD, USER, ActionType::Mute).await.unwrap(), 1);

        tokio::time::advance(Duration::from_millis(1_100)).await;
        engine.scheduler().tick().await.unwrap();

        let table: ActiveMuteTable = engine
            .store
            .get(GUILD, StateKey::ActiveMutes)
            .await
            .unwrap()
            .unwrap_or_default();
        assert!(table.is_empty());
        assert_eq!(
            platform.count(|c| matches!(c, PlatformCall::RemoveRole { user: USER, role: MUTED_ROLE })),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_mute_requires_configuration_and_member() {
        let (engine, platform) = engine(false).await;
        let err = engine
            .mute(GUILD, USER, MuteDuration::Permanent, "permanent")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)));

        engine
            .update_settings(GUILD, |s| s.muted_role = Some(MUTED_ROLE))
            .await
            .unwrap();
        platform.mark_absent(USER);
        let err = engine
            .mute(GUILD, USER, MuteDuration::Permanent, "permanent")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MemberNotFound { guild: GUILD, user: USER }));

        // Rejected mutes are not counted
        assert_eq!(engine.recorder().get_count(GUILD, USER, ActionType::Mute).await.unwrap(), 0);
        assert!(platform.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmute_reverses_permanent_mute() {
        let (engine, platform) = engine(true).await;
        engine
            .mute(GUILD, USER, MuteDuration::Permanent, "permanent")
            .await
            .unwrap();

        let unmuted = engine.unmute(GUILD, USER).await.unwrap();
        assert_eq!(unmuted.removed.len(), 1);
        assert_eq!(unmuted.reversal, Reversal::RoleRemoved);
        assert!(engine.scheduler().active_mutes(GUILD, USER).await.unwrap().is_empty());
        assert!(platform.calls().contains(&PlatformCall::DirectMessage {
            user: USER,
            text: "You have been unmuted on Guild 7. You may now send messages.".to_string(),
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_mute_leaves_no_record() {
        let (engine, platform) = engine(true).await;

        platform.fail_roles(true);
        assert!(engine
            .mute(GUILD, USER, MuteDuration::Timed(60_000), "1m")
            .await
            .is_err());
        assert!(engine.scheduler().active_mutes(GUILD, USER).await.unwrap().is_empty());
        assert!(platform.calls().is_empty());

        platform.fail_roles(false);
        engine
            .mute(GUILD, USER, MuteDuration::Timed(60_000), "1m")
            .await
            .unwrap();
        assert_eq!(engine.scheduler().active_mutes(GUILD, USER).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mute_storage_failure_applies_nothing() {
        let backend = Arc::new(MemoryBackend::new());
        let platform = Arc::new(RecordingPlatform::new());
        let engine = ModerationEngine::new(
            Store::new(backend.clone()),
            platform.clone(),
            Arc::new(TokioClock::starting_at(0)),
            Duration::from_secs(60),
        );
        engine
            .update_settings(GUILD, |s| s.muted_role = Some(MUTED_ROLE))
            .await
            .unwrap();

        backend.fail_writes(true);
        let err = engine
            .mute(GUILD, USER, MuteDuration::Timed(60_000), "1m")
            .await
            .unwrap_err();
        assert!(err.is_storage_failure());
        assert!(platform.calls().is_empty());

        backend.fail_writes(false);
        assert!(engine.scheduler().active_mutes(GUILD, USER).await.unwrap().is_empty());
        assert_eq!(engine.recorder().get_count(GUILD, USER, ActionType::Mute).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sanctions_are_counted() {
        let (engine, platform) = engine(true).await;

        assert_eq!(engine.warn(GUILD, USER).await.unwrap(), 1);
        assert_eq!(engine.warn(GUILD, USER).await.unwrap(), 2);
        engine.kick(GUILD, USER).await.unwrap();
        engine.soft_ban(GUILD, USER).await.unwrap();
        engine.ban(GUILD, USER).await.unwrap();
        engine.unban(GUILD, USER).await.unwrap();

        let recorder = engine.recorder();
        assert_eq!(recorder.get_count(GUILD, USER, ActionType::Warning).await.unwrap(), 2);
        assert_eq!(recorder.get_count(GUILD, USER, ActionType::Kick).await.unwrap(), 2);
        assert_eq!(recorder.get_count(GUILD, USER, ActionType::Ban).await.unwrap(), 1);

        assert_eq!(
            platform.calls(),
            vec![
                PlatformCall::Kick { guild: GUILD, user: USER },
                PlatformCall::Ban { guild: GUILD, user: USER },
                PlatformCall::Unban { guild: GUILD, user: USER },
                PlatformCall::Ban { guild: GUILD, user: USER },
                PlatformCall::Unban { guild: GUILD, user: USER },
            ]
        );
    }

    #[tokio::test]
    async fn test_log_case_posts_to_mod_log() {
        let (engine, platform) = engine(true).await;
        let entry = CaseEntry {
            user_id: USER,
            user_tag: "spammer".to_string(),
            kind: CaseKind::Action(ActionType::Kick),
            reason: "Spam".to_string(),
            issuer_tag: "mod".to_string(),
            length: None,
        };

        assert_eq!(engine.log_case(GUILD, &entry).await.unwrap(), 1);
        assert_eq!(engine.log_case(GUILD, &entry).await.unwrap(), 2);

        let posts: Vec<_> = platform
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                PlatformCall::ChannelMessage { channel: MOD_LOG, text } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(posts.len(), 2);
        assert!(posts[1].starts_with("**Case 2 | Kick**"));
    }

    #[tokio::test]
    async fn test_muted_overwrites_on_new_channel() {
        let (engine, platform) = engine(false).await;
        assert!(!engine.apply_muted_overwrites(GUILD, 3).await.unwrap());

        engine
            .update_settings(GUILD, |s| s.muted_role = Some(MUTED_ROLE))
            .await
            .unwrap();
        assert!(engine.apply_muted_overwrites(GUILD, 3).await.unwrap());
        assert_eq!(
            platform.calls(),
            vec![PlatformCall::Overwrite {
                channel: 3,
                role: MUTED_ROLE,
                change: OverwriteChange::deny(MUTED_DENY),
            }]
        );
    }

    #[tokio::test]
    async fn test_muted_overwrite_failure_is_reported() {
        let (engine, platform) = engine(true).await;
        platform.fail_overwrites(true);
        let err = engine.apply_muted_overwrites(GUILD, 3).await.unwrap_err();
        assert!(!err.is_storage_failure());
        assert!(platform.calls().is_empty());
    }
}
