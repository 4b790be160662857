use std::sync::Arc;

use poise::serenity_prelude::{self as serenity, GatewayIntents, GuildId, Http};
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::bot::data::Data;
use crate::bot::error::Error;
use crate::commands;
use crate::config::Settings;
use crate::db::queries::state::PgStateBackend;
use crate::db::store::Store;
use crate::handlers::{event_handler::event_handler, lockdown_events};
use crate::services::clock::SystemClock;
use crate::services::moderation::ModerationEngine;
use crate::services::platform::{ChatPlatform, SerenityPlatform};

pub async fn run(settings: Settings, pool: PgPool) -> Result<(), Error> {
    let http = Arc::new(Http::new(&settings.discord_token));
    let platform: Arc<dyn ChatPlatform> = Arc::new(SerenityPlatform::new(http));
    let store = Store::new(Arc::new(PgStateBackend::new(pool)));
    let engine = ModerationEngine::new(
        store,
        platform.clone(),
        Arc::new(SystemClock),
        settings.mute_check_interval(),
    );
    let data = Arc::new(Data::new(settings.clone(), engine.clone()));

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::moderation::warn(),
                commands::moderation::mute(),
                commands::moderation::unmute(),
                commands::moderation::kick(),
                commands::moderation::ban(),
                commands::moderation::unban(),
                commands::moderation::softban(),
                commands::lockdown::lockdown(),
                commands::modconfig::modconfig(),
                commands::stats::modstats(),
            ],
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: None, // Slash commands only
                ..Default::default()
            },
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } if error.is_storage_failure() => {
                            error!("Storage failure in /{}: {:?}", ctx.command().name, error);
                            let _ = ctx
                                .say("Could not save moderation data, please try again.")
                                .await;
                        }
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!("Command error: {:?}", error);
                            let _ = ctx.say(format!("Error: {}", error)).await;
                        }
                        poise::FrameworkError::ArgumentParse { error, ctx, .. } => {
                            let _ = ctx.say(format!("Invalid argument: {}", error)).await;
                        }
                        poise::FrameworkError::MissingUserPermissions { ctx, .. } => {
                            let _ = ctx.say("You need moderator permissions to do that.").await;
                        }
                        poise::FrameworkError::UnknownCommand { .. } => {}
                        err => {
                            error!("Framework error: {:?}", err);
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot connected as {}", ready.user.name);

                // Lockdown expiry notices go out before timers are restored
                lockdown_events::spawn_lockdown_listener(
                    platform.clone(),
                    data.engine.lockdown().subscribe(),
                );

                match data.engine.start().await {
                    Ok(report) => info!(
                        "Moderation engine started ({} lockdowns re-armed, {} lifted)",
                        report.rearmed, report.expired
                    ),
                    Err(e) => {
                        // Mutes still expire; lockdowns restore on the next start
                        error!("Failed to restore lockdowns: {:?}", e);
                        data.engine.scheduler().start().await;
                    }
                }

                match data.settings.guild_id {
                    Some(guild_id) => {
                        let guild_id = GuildId::new(guild_id);
                        info!(
                            "Registering {} commands in guild {}",
                            framework.options().commands.len(),
                            guild_id
                        );
                        poise::builtins::register_in_guild(ctx, &framework.options().commands, guild_id)
                            .await
                            .map_err(|e| {
                                error!("[FAIL] Failed to register guild commands: {:?}", e);
                                Error::Serenity(e)
                            })?;
                    }
                    None => {
                        info!(
                            "Registering {} commands globally",
                            framework.options().commands.len()
                        );
                        poise::builtins::register_globally(ctx, &framework.options().commands)
                            .await
                            .map_err(|e| {
                                error!("Failed to register commands globally: {:?}", e);
                                Error::Serenity(e)
                            })?;
                        info!("Note: Global commands can take up to 1 hour to appear in all servers");
                    }
                }

                Ok(data)
            })
        })
        .build();

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MEMBERS;

    let mut client = serenity::ClientBuilder::new(&settings.discord_token, intents)
        .framework(framework)
        .await
        .map_err(Error::Serenity)?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for shutdown signal: {:?}", e);
            return;
        }
        info!("Shutting down...");
        engine.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    info!("Starting Discord client...");
    client.start().await.map_err(Error::Serenity)
}
