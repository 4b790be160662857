use thiserror::Error;

use crate::services::duration::DurationError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Discord API error: {0}")]
    Serenity(#[from] serenity::Error),

    #[error("Member {user} not found in guild {guild}")]
    MemberNotFound { guild: u64, user: u64 },

    #[error("Channel not found: {0}")]
    ChannelNotFound(u64),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    InvalidDuration(#[from] DurationError),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn custom<S: Into<String>>(msg: S) -> Self {
        Error::Custom(msg.into())
    }

    /// Storage failures abort the whole operation; everything else is
    /// scoped to a single record or call.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Serialization(_) | Error::Storage(_)
        )
    }
}
