use poise::serenity_prelude::User;

use super::{guild_id, reply};
use crate::bot::data::Context;
use crate::bot::error::Error;
use crate::constants::embeds;
use crate::db::models::{ActionType, MuteDuration};
use crate::services::duration;
use crate::utils::formatting::{mention_user, truncate, CaseEntry, CaseKind};

const MAX_REASON_LENGTH: usize = 512;

/// Record the case in the mod-log and return its number
async fn log_case(
    ctx: Context<'_>,
    user: &User,
    kind: CaseKind,
    reason: Option<String>,
    length: Option<String>,
) -> Result<u64, Error> {
    let entry = CaseEntry {
        user_id: user.id.get(),
        user_tag: user.tag(),
        kind,
        reason: truncate(
            reason.as_deref().unwrap_or("No reason provided"),
            MAX_REASON_LENGTH,
        ),
        issuer_tag: ctx.author().tag(),
        length,
    };
    ctx.data().engine.log_case(guild_id(ctx)?, &entry).await
}

/// Warn a member
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "Member to warn"] user: User,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let count = ctx.data().engine.warn(guild_id(ctx)?, user.id.get()).await?;
    let case = log_case(ctx, &user, CaseKind::Action(ActionType::Warning), reason, None).await?;

    let embed = embeds::warning_embed()
        .title("Member Warned")
        .description(format!(
            "{} has been warned. This is warning #{}.",
            mention_user(user.id.get()),
            count
        ))
        .footer(poise::serenity_prelude::CreateEmbedFooter::new(format!("Case {}", case)));
    reply(ctx, embed).await
}

/// Mute a member, optionally for a limited time (e.g. 30m, 5h, 1d)
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn mute(
    ctx: Context<'_>,
    #[description = "Member to mute"] user: User,
    #[description = "Duration such as 30s, 10m, 5h or 1d; permanent if omitted"] duration: Option<String>,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let (mute_duration, descriptor) = match duration.as_deref() {
        Some(input) => {
            let ms = duration::parse(input)?;
            (MuteDuration::Timed(ms), duration::format(ms))
        }
        None => (MuteDuration::Permanent, "permanent".to_string()),
    };

    ctx.data()
        .engine
        .mute(guild_id(ctx)?, user.id.get(), mute_duration, &descriptor)
        .await?;

    let length = matches!(mute_duration, MuteDuration::Timed(_)).then(|| descriptor.clone());
    let case = log_case(ctx, &user, CaseKind::Action(ActionType::Mute), reason, length).await?;

    let embed = embeds::success_embed()
        .title("Member Muted")
        .description(format!(
            "{} has been muted ({}).",
            mention_user(user.id.get()),
            descriptor
        ))
        .footer(poise::serenity_prelude::CreateEmbedFooter::new(format!("Case {}", case)));
    reply(ctx, embed).await
}

/// Unmute a member
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn unmute(
    ctx: Context<'_>,
    #[description = "Member to unmute"] user: User,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let unmuted = ctx.data().engine.unmute(guild_id(ctx)?, user.id.get()).await?;
    log_case(ctx, &user, CaseKind::Unmute, reason, None).await?;

    let description = if unmuted.removed.is_empty() {
        format!(
            "{} had no recorded mutes; the muted role was removed anyway.",
            mention_user(user.id.get())
        )
    } else {
        format!("{} has been unmuted.", mention_user(user.id.get()))
    };
    reply(ctx, embeds::success_embed().title("Member Unmuted").description(description)).await
}

/// Kick a member
#[poise::command(slash_command, guild_only, required_permissions = "KICK_MEMBERS")]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "Member to kick"] user: User,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    ctx.data().engine.kick(guild_id(ctx)?, user.id.get()).await?;
    let case = log_case(ctx, &user, CaseKind::Action(ActionType::Kick), reason, None).await?;

    let embed = embeds::success_embed()
        .title("Member Kicked")
        .description(format!("{} has been kicked. (Case {})", user.tag(), case));
    reply(ctx, embed).await
}

/// Ban a member and purge a week of their messages
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "Member to ban"] user: User,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    ctx.data().engine.ban(guild_id(ctx)?, user.id.get()).await?;
    let case = log_case(ctx, &user, CaseKind::Action(ActionType::Ban), reason, None).await?;

    let embed = embeds::success_embed()
        .title("Member Banned")
        .description(format!("{} has been banned. (Case {})", user.tag(), case));
    reply(ctx, embed).await
}

/// Lift a ban
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "User to unban"] user: User,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    ctx.data().engine.unban(guild_id(ctx)?, user.id.get()).await?;
    let case = log_case(ctx, &user, CaseKind::Unban, reason, None).await?;

    let embed = embeds::success_embed()
        .title("User Unbanned")
        .description(format!("{} has been unbanned. (Case {})", user.tag(), case));
    reply(ctx, embed).await
}

/// Kick a member and purge a week of their messages
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn softban(
    ctx: Context<'_>,
    #[description = "Member to softban"] user: User,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    ctx.data().engine.soft_ban(guild_id(ctx)?, user.id.get()).await?;
    let case = log_case(ctx, &user, CaseKind::Softban, reason, None).await?;

    let embed = embeds::success_embed()
        .title("Member Softbanned")
        .description(format!(
            "{} has been softbanned and may rejoin. (Case {})",
            user.tag(),
            case
        ));
    reply(ctx, embed).await
}
