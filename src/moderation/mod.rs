//! Moderation facade
//!
//! Every surface (slash commands, automod buttons, the dashboard API) goes
//! through [`ModerationService`], which records warnings and strikes, calls
//! the platform for ban/kick/timeout and feeds the daily stats.

mod discord;
mod error;
mod platform;
mod service;

pub use discord::SerenityPlatform;
pub use error::{ModerationError, ModerationResult, PlatformError};
pub use platform::{AccessLevel, AccessTarget, ChannelAccess, ChannelSpec, MemberSummary, Platform};
pub use service::{MAX_TIMEOUT_MINUTES, ModerationDefaults, ModerationService, StrikeOutcome};

#[cfg(test)]
pub use platform::MockPlatform;
