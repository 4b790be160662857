pub mod lockdown;
pub mod modconfig;
pub mod moderation;
pub mod stats;

use poise::serenity_prelude::CreateEmbed;

use crate::bot::data::Context;
use crate::bot::error::Error;

fn guild_id(ctx: Context<'_>) -> Result<u64, Error> {
    ctx.guild_id()
        .map(|g| g.get())
        .ok_or(Error::custom("Not in a guild"))
}

async fn reply(ctx: Context<'_>, embed: CreateEmbed) -> Result<(), Error> {
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
