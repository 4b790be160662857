use std::sync::Arc;

use poise::serenity_prelude::{self as serenity, ChannelType, FullEvent};
use tracing::{debug, info, warn};

use crate::bot::data::Data;
use crate::bot::error::Error;

const WELCOME_MESSAGE: &str = "Hello! I'm here to help you with your server moderation needs. \
    To get started, create a `Muted` role and run `/modconfig muted-role` in your server, \
    then pick a channel for case logs with `/modconfig mod-log`.";

pub async fn event_handler(
    ctx: &serenity::Context,
    event: &FullEvent,
    _framework: poise::FrameworkContext<'_, Arc<Data>, Error>,
    data: &Arc<Data>,
) -> Result<(), Error> {
    match event {
        FullEvent::Ready { data_about_bot, .. } => {
            info!("Bot ready as {}", data_about_bot.user.name);
        }

        FullEvent::ChannelCreate { channel } => {
            if !matches!(channel.kind, ChannelType::Text | ChannelType::Voice) {
                return Ok(());
            }
            match data
                .engine
                .apply_muted_overwrites(channel.guild_id.get(), channel.id.get())
                .await
            {
                Ok(true) => info!(
                    "Set muted role permissions in channel {}/{}",
                    channel.guild_id, channel.name
                ),
                Ok(false) => debug!("Guild {} has no muted role yet", channel.guild_id),
                Err(e) => warn!(
                    "Failed to set muted role permissions in channel {}: {:?}",
                    channel.id, e
                ),
            }
        }

        FullEvent::GuildCreate { guild, is_new } => {
            if *is_new == Some(true) {
                info!("Joined guild {} ({})", guild.name, guild.id);
                let dm = guild.owner_id.create_dm_channel(ctx).await;
                match dm {
                    Ok(channel) => {
                        if let Err(e) = channel.say(ctx, WELCOME_MESSAGE).await {
                            debug!("Could not DM owner of guild {}: {:?}", guild.id, e);
                        }
                    }
                    Err(e) => debug!("Could not open DM with owner of guild {}: {:?}", guild.id, e),
                }
            }
        }

        FullEvent::GuildDelete { incomplete, .. } => {
            debug!("Guild {} removed", incomplete.id);
        }

        _ => {}
    }

    Ok(())
}
