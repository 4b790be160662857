use poise::serenity_prelude::{Channel, Role};
use tracing::warn;

use super::{guild_id, reply};
use crate::bot::data::Context;
use crate::bot::error::Error;
use crate::constants::embeds;
use crate::utils::formatting::mention_channel;

/// Configure moderation roles and channels
#[poise::command(
    slash_command,
    subcommands("muted_role", "mod_log"),
    required_permissions = "ADMINISTRATOR",
    guild_only
)]
pub async fn modconfig(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say("Use one of the subcommands: `/modconfig muted-role`, `/modconfig mod-log`").await?;
    Ok(())
}

/// Set the role given to muted members
#[poise::command(slash_command, rename = "muted-role", guild_only)]
pub async fn muted_role(
    ctx: Context<'_>,
    #[description = "Role that denies sending messages"] role: Role,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let engine = &ctx.data().engine;
    engine
        .update_settings(guild_id, |s| s.muted_role = Some(role.id.get()))
        .await?;

    // Apply the role's overwrites to every existing channel
    let channels = ctx.http().get_channels(poise::serenity_prelude::GuildId::new(guild_id)).await?;
    let mut applied = 0;
    for channel in channels {
        match engine.apply_muted_overwrites(guild_id, channel.id.get()).await {
            Ok(true) => applied += 1,
            Ok(false) => {}
            Err(e) => warn!(
                "Failed to apply muted role overwrites on channel {}: {:?}",
                channel.id, e
            ),
        }
    }

    let embed = embeds::success_embed()
        .title("Muted Role Set")
        .description(format!(
            "Muted members will get <@&{}>. Permissions applied to {} channel(s).",
            role.id, applied
        ));
    reply(ctx, embed).await
}

/// Set the channel where moderation cases are logged
#[poise::command(slash_command, rename = "mod-log", guild_only)]
pub async fn mod_log(
    ctx: Context<'_>,
    #[description = "Text channel for case logs"]
    #[channel_types("Text")]
    channel: Channel,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    ctx.data()
        .engine
        .update_settings(guild_id, |s| s.mod_log_channel = Some(channel.id().get()))
        .await?;

    let embed = embeds::success_embed()
        .title("Mod Log Set")
        .description(format!("Cases will be posted in {}", mention_channel(channel.id().get())));
    reply(ctx, embed).await
}
