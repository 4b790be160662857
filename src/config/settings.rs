use std::env;
use std::time::Duration;

use crate::constants::timeouts::DEFAULT_MUTE_CHECK_INTERVAL_SECONDS;

#[derive(Debug, Clone)]
pub struct Settings {
    pub discord_token: String,
    pub database_url: String,
    pub guild_id: Option<u64>,
    /// How often expired mutes are lifted
    pub mute_check_interval_seconds: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self, String> {
        let discord_token = env::var("DISCORD_TOKEN")
            .map_err(|_| "DISCORD_TOKEN environment variable not set")?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable not set")?;

        let guild_id = env::var("GUILD_ID")
            .ok()
            .and_then(|s| s.parse::<u64>().ok());

        let mute_check_interval_seconds = env::var("MUTE_CHECK_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&secs: &u64| secs > 0)
            .unwrap_or(DEFAULT_MUTE_CHECK_INTERVAL_SECONDS);

        Ok(Self {
            discord_token,
            database_url,
            guild_id,
            mute_check_interval_seconds,
        })
    }

    pub fn mute_check_interval(&self) -> Duration {
        Duration::from_secs(self.mute_check_interval_seconds)
    }
}
