use poise::serenity_prelude::{Channel, ChannelId};
use tracing::{info, warn};

use super::{guild_id, reply};
use crate::bot::data::Context;
use crate::bot::error::Error;
use crate::constants::embeds;
use crate::constants::timeouts::LOCKDOWN_CLEAR_GRACE_MS;
use crate::handlers::lockdown_events::LOCKDOWN_ENDED_MESSAGE;
use crate::services::duration;
use crate::utils::formatting::mention_channel;

/// Lock down a channel for a set time, or `clear` an active lockdown
///
/// Uses duration shorthand: 30s, 10m, 5h, 1d. Locking down a channel that is
/// already locked down restarts the lockdown with the new duration.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_CHANNELS")]
pub async fn lockdown(
    ctx: Context<'_>,
    #[description = "Duration (30s, 10m, 5h, 1d) or `clear`"] duration_or_clear: String,
    #[description = "Channel to lock down (defaults to this one)"]
    #[channel_types("Text")]
    channel: Option<Channel>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let channel_id = match &channel {
        Some(channel) => {
            let in_guild = channel
                .clone()
                .guild()
                .is_some_and(|c| c.guild_id.get() == guild_id);
            if !in_guild {
                let embed = embeds::error_embed()
                    .title("Wrong Server")
                    .description("You may not lock down channels in other servers.");
                return reply(ctx, embed).await;
            }
            channel.id()
        }
        None => ctx.channel_id(),
    };
    let lockdowns = ctx.data().engine.lockdown();

    if duration_or_clear.trim().eq_ignore_ascii_case("clear") {
        if !lockdowns.is_locked_down(guild_id, channel_id.get()).await? {
            let embed = embeds::error_embed()
                .title("Not Locked Down")
                .description(format!("{} is not locked down.", mention_channel(channel_id.get())));
            return reply(ctx, embed).await;
        }

        if lockdowns.get_remaining(guild_id, channel_id.get()).await? < LOCKDOWN_CLEAR_GRACE_MS {
            let embed = embeds::warning_embed()
                .title("Almost Over")
                .description("The lockdown on the channel is about to expire. Just wait it out.");
            return reply(ctx, embed).await;
        }

        lockdowns.remove(guild_id, channel_id.get()).await?;
        announce(ctx, channel_id, LOCKDOWN_ENDED_MESSAGE).await;

        let embed = embeds::success_embed()
            .title("Lockdown Cleared")
            .description(format!("Lifted the lockdown on {}.", mention_channel(channel_id.get())));
        return reply(ctx, embed).await;
    }

    let ms = duration::parse(&duration_or_clear)?;
    if ms == 0 {
        let embed = embeds::error_embed()
            .title("Invalid Duration")
            .description("You must provide a valid lockdown duration, e.g. 30s, 10m, 5h or 1d.");
        return reply(ctx, embed).await;
    }
    let duration_text = duration::format(ms);

    announce(
        ctx,
        channel_id,
        &format!("***This channel is locked down. ({})***", duration_text),
    )
    .await;
    lockdowns.set(guild_id, channel_id.get(), ms).await?;
    info!("Lockdown: channel {} in guild {} for {}", channel_id, guild_id, duration_text);

    let embed = embeds::success_embed()
        .title("Channel Locked Down")
        .description(format!(
            "Locked down {}. ({})",
            mention_channel(channel_id.get()),
            duration_text
        ));
    reply(ctx, embed).await
}

async fn announce(ctx: Context<'_>, channel_id: ChannelId, text: &str) {
    if let Err(e) = channel_id.say(ctx.serenity_context(), text).await {
        warn!("Failed to post lockdown notice in channel {}: {:?}", channel_id, e);
    }
}
