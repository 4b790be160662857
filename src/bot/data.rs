use std::fmt;
use std::sync::Arc;

use crate::config::Settings;
use crate::services::moderation::ModerationEngine;

/// Shared data available to all commands and handlers
pub struct Data {
    pub settings: Settings,
    pub engine: ModerationEngine,
}

impl Data {
    pub fn new(settings: Settings, engine: ModerationEngine) -> Self {
        Self { settings, engine }
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("guild_id", &self.settings.guild_id)
            .finish_non_exhaustive()
    }
}

pub type Context<'a> = poise::Context<'a, Arc<Data>, crate::bot::error::Error>;
