use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{
    ChannelId, CreateMessage, GuildId, Http, PermissionOverwrite, PermissionOverwriteType,
    Permissions, RoleId, UserId,
};
use serenity::http::HttpError;
use tracing::debug;

use crate::bot::error::Error;
use crate::constants::timeouts::BAN_DELETE_MESSAGE_DAYS;

/// A resolved guild member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef {
    pub guild_id: u64,
    pub user_id: u64,
}

/// Change to a role's permission overwrite on a channel. Bits in `reset`
/// go back to inherited (neither allowed nor denied).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverwriteChange {
    pub allow: Permissions,
    pub deny: Permissions,
    pub reset: Permissions,
}

impl OverwriteChange {
    pub fn deny(permissions: Permissions) -> Self {
        Self {
            allow: Permissions::empty(),
            deny: permissions,
            reset: Permissions::empty(),
        }
    }

    pub fn reset(permissions: Permissions) -> Self {
        Self {
            allow: Permissions::empty(),
            deny: Permissions::empty(),
            reset: permissions,
        }
    }

    /// Merge this change into an existing (allow, deny) pair
    pub fn apply(&self, allow: Permissions, deny: Permissions) -> (Permissions, Permissions) {
        let allow = (allow | self.allow) - self.deny - self.reset;
        let deny = (deny | self.deny) - self.allow - self.reset;
        (allow, deny)
    }
}

/// Everything the moderation core needs from the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// `Ok(None)` when the user is not (or no longer) a member
    async fn find_member(&self, guild_id: u64, user_id: u64) -> Result<Option<MemberRef>, Error>;

    async fn add_role(&self, member: &MemberRef, role_id: u64) -> Result<(), Error>;

    async fn remove_role(&self, member: &MemberRef, role_id: u64) -> Result<(), Error>;

    async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<(), Error>;

    async fn send_channel_message(&self, channel_id: u64, text: &str) -> Result<(), Error>;

    async fn set_channel_permission_overwrite(
        &self,
        channel_id: u64,
        role_id: u64,
        change: OverwriteChange,
    ) -> Result<(), Error>;

    async fn ban_member(&self, guild_id: u64, user_id: u64) -> Result<(), Error>;

    async fn unban_member(&self, guild_id: u64, user_id: u64) -> Result<(), Error>;

    async fn kick_member(&self, guild_id: u64, user_id: u64) -> Result<(), Error>;

    async fn guild_name(&self, guild_id: u64) -> Option<String>;
}

/// `ChatPlatform` over Discord's HTTP API
#[derive(Clone)]
pub struct SerenityPlatform {
    http: Arc<Http>,
}

impl SerenityPlatform {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn is_not_found(error: &serenity::Error) -> bool {
    matches!(
        error,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 404
    )
}

#[async_trait]
impl ChatPlatform for SerenityPlatform {
    async fn find_member(&self, guild_id: u64, user_id: u64) -> Result<Option<MemberRef>, Error> {
        match self
            .http
            .get_member(GuildId::new(guild_id), UserId::new(user_id))
            .await
        {
            Ok(_) => Ok(Some(MemberRef { guild_id, user_id })),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(Error::Serenity(e)),
        }
    }

    async fn add_role(&self, member: &MemberRef, role_id: u64) -> Result<(), Error> {
        self.http
            .add_member_role(
                GuildId::new(member.guild_id),
                UserId::new(member.user_id),
                RoleId::new(role_id),
                Some("Muted"),
            )
            .await?;
        Ok(())
    }

    async fn remove_role(&self, member: &MemberRef, role_id: u64) -> Result<(), Error> {
        self.http
            .remove_member_role(
                GuildId::new(member.guild_id),
                UserId::new(member.user_id),
                RoleId::new(role_id),
                Some("Unmuted"),
            )
            .await?;
        Ok(())
    }

    async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<(), Error> {
        let dm_channel = UserId::new(user_id)
            .create_dm_channel(self.http.as_ref())
            .await?;
        dm_channel
            .send_message(self.http.as_ref(), CreateMessage::new().content(text))
            .await?;
        Ok(())
    }

    async fn send_channel_message(&self, channel_id: u64, text: &str) -> Result<(), Error> {
        ChannelId::new(channel_id)
            .say(self.http.as_ref(), text)
            .await?;
        Ok(())
    }

    async fn set_channel_permission_overwrite(
        &self,
        channel_id: u64,
        role_id: u64,
        change: OverwriteChange,
    ) -> Result<(), Error> {
        let channel_id = ChannelId::new(channel_id);
        let role_id = RoleId::new(role_id);

        let channel = channel_id
            .to_channel(self.http.as_ref())
            .await?
            .guild()
            .ok_or(Error::ChannelNotFound(channel_id.get()))?;

        let (allow, deny) = channel
            .permission_overwrites
            .iter()
            .find(|o| o.kind == PermissionOverwriteType::Role(role_id))
            .map(|o| (o.allow, o.deny))
            .unwrap_or((Permissions::empty(), Permissions::empty()));

        let (allow, deny) = change.apply(allow, deny);
        let overwrite = PermissionOverwrite {
            allow,
            deny,
            kind: PermissionOverwriteType::Role(role_id),
        };

        channel_id
            .create_permission(self.http.as_ref(), overwrite)
            .await?;

        debug!(
            "Updated overwrite for role {} on channel {} (allow {:?}, deny {:?})",
            role_id, channel_id, allow, deny
        );
        Ok(())
    }

    async fn ban_member(&self, guild_id: u64, user_id: u64) -> Result<(), Error> {
        self.http
            .ban_user(
                GuildId::new(guild_id),
                UserId::new(user_id),
                BAN_DELETE_MESSAGE_DAYS,
                None,
            )
            .await?;
        Ok(())
    }

    async fn unban_member(&self, guild_id: u64, user_id: u64) -> Result<(), Error> {
        self.http
            .remove_ban(GuildId::new(guild_id), UserId::new(user_id), None)
            .await?;
        Ok(())
    }

    async fn kick_member(&self, guild_id: u64, user_id: u64) -> Result<(), Error> {
        self.http
            .kick_member(GuildId::new(guild_id), UserId::new(user_id), None)
            .await?;
        Ok(())
    }

    async fn guild_name(&self, guild_id: u64) -> Option<String> {
        self.http
            .get_guild(GuildId::new(guild_id))
            .await
            .ok()
            .map(|guild| guild.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_deny_then_reset() {
        let send = Permissions::SEND_MESSAGES;
        let view = Permissions::VIEW_CHANNEL;

        let (allow, deny) = OverwriteChange::deny(send).apply(send | view, Permissions::empty());
        assert_eq!(allow, view);
        assert_eq!(deny, send);

        let (allow, deny) = OverwriteChange::reset(send).apply(allow, deny);
        assert_eq!(allow, view);
        assert!(deny.is_empty());
    }
}
