//! Platform seam
//!
//! The facade only talks to the chat platform through this trait, so tests
//! can substitute a mock and the Discord specifics stay in one adapter.

use crate::moderation::PlatformError;
use serde::Serialize;
use std::time::Duration;

/// Minimal view of a guild member or user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberSummary {
    pub id: String,
    pub username: String,
}

/// Who a channel permission applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessTarget {
    /// The guild's `@everyone` role
    Everyone,
    Role(u64),
    Member(String),
}

/// Coarse channel permission levels used by tickets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Hidden,
    ReadOnly,
    ReadWrite,
    Manage,
}

/// One permission overwrite on a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAccess {
    pub target: AccessTarget,
    pub level: AccessLevel,
}

impl ChannelAccess {
    pub fn new(target: AccessTarget, level: AccessLevel) -> Self {
        Self { target, level }
    }
}

/// A text channel to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub topic: Option<String>,
    pub access: Vec<ChannelAccess>,
}

/// Actions the bot performs on the chat platform.
///
/// Every call may fail; callers log the failure and report it, nothing retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Platform: Send + Sync {
    async fn ban(&self, subject: &str, reason: &str) -> Result<(), PlatformError>;

    async fn unban(&self, subject: &str) -> Result<(), PlatformError>;

    async fn kick(&self, subject: &str, reason: &str) -> Result<(), PlatformError>;

    /// Time a member out for `duration`, or lift the timeout when `None`
    async fn timeout(
        &self,
        subject: &str,
        duration: Option<Duration>,
        reason: &str,
    ) -> Result<(), PlatformError>;

    /// Fetch a current guild member
    async fn fetch_member(&self, subject: &str) -> Result<MemberSummary, PlatformError>;

    /// Look a user up by id, or a guild member by username / legacy tag
    async fn find_member(&self, query: &str) -> Result<Option<MemberSummary>, PlatformError>;

    async fn direct_message(&self, subject: &str, text: &str) -> Result<(), PlatformError>;

    /// Set a member's server nickname; an empty nickname resets it
    async fn set_nickname(&self, subject: &str, nickname: &str) -> Result<(), PlatformError>;

    /// Create a text channel and return its id
    async fn create_channel(&self, spec: ChannelSpec) -> Result<u64, PlatformError>;

    async fn set_channel_access(
        &self,
        channel_id: u64,
        access: ChannelAccess,
    ) -> Result<(), PlatformError>;
}
