//! Error types for moderation operations

use thiserror::Error;

/// Errors raised by the platform adapter
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The subject string is not a usable user id
    #[error("Invalid user id: {0}")]
    InvalidSubject(String),

    /// A role or channel id from configuration is unusable
    #[error("Invalid id: {0}")]
    InvalidId(String),

    /// Discord API error
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<poise::serenity_prelude::Error>),

    /// Generic error
    #[error("Platform error: {0}")]
    Other(String),
}

impl From<poise::serenity_prelude::Error> for PlatformError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::DiscordApi(Box::new(error))
    }
}

/// Errors surfaced by the moderation facade
#[derive(Debug, Error)]
pub enum ModerationError {
    /// Identity resolution found nobody
    #[error("User not found: {0}")]
    SubjectNotFound(String),

    /// The platform rejected or failed the action
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Result type for moderation operations
pub type ModerationResult<T> = Result<T, ModerationError>;
