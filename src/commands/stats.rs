use poise::serenity_prelude::User;

use super::{guild_id, reply};
use crate::bot::data::Context;
use crate::bot::error::Error;
use crate::constants::embeds;
use crate::db::models::{ActionType, MuteDuration};
use crate::utils::formatting::mention_user;

/// Show a member's moderation history
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn modstats(
    ctx: Context<'_>,
    #[description = "Member to look up"] user: User,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let engine = &ctx.data().engine;

    let mut lines = Vec::new();
    for action in ActionType::ALL {
        let count = engine
            .recorder()
            .get_count(guild_id, user.id.get(), action)
            .await?;
        lines.push(format!("**{}:** {}", action.label(), count));
    }

    let mutes = engine.scheduler().active_mutes(guild_id, user.id.get()).await?;
    let active = match mutes.iter().find(|m| m.duration == MuteDuration::Permanent) {
        Some(_) => "permanent".to_string(),
        None if mutes.is_empty() => "no".to_string(),
        None => mutes
            .iter()
            .map(|m| m.descriptor.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    };
    lines.push(format!("**Currently muted:** {}", active));

    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    let embed = embeds::info_embed()
        .title(format!("Moderation history for {}", user.tag()))
        .description(format!(
            "{}\n{}",
            mention_user(user.id.get()),
            embeds::bullet_list(&lines)
        ));
    reply(ctx, embed).await
}
