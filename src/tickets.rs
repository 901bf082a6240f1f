//! Support tickets
//!
//! Opening a ticket creates a private text channel named after a per-kind
//! sequence number. Sequence counters are persisted like the other stores.

use crate::config::TicketSettings;
use crate::moderation::{AccessLevel, AccessTarget, ChannelAccess, ChannelSpec, Platform, PlatformError};
use crate::store::{JsonFile, SCHEMA_VERSION};
use dashmap::DashMap;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Kinds of ticket offered on the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketKind {
    #[display("general")]
    General,
    #[display("management")]
    Management,
    #[display("internal")]
    Internal,
}

impl TicketKind {
    pub const ALL: [Self; 3] = [Self::General, Self::Management, Self::Internal];

    /// Human-readable panel label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::General => "General Support",
            Self::Management => "Management Support",
            Self::Internal => "Internal Affairs",
        }
    }

    #[must_use]
    pub fn emoji(self) -> char {
        match self {
            Self::General => '💬',
            Self::Management => '🛠',
            Self::Internal => '⚖',
        }
    }
}

impl FromStr for TicketKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(Self::General),
            "management" => Ok(Self::Management),
            "internal" => Ok(Self::Internal),
            other => Err(format!("Unknown ticket kind: {other}")),
        }
    }
}

/// A freshly created ticket channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedTicket {
    pub kind: TicketKind,
    pub number: u64,
    pub channel_id: u64,
    pub channel_name: String,
    pub support_role: Option<u64>,
}

#[derive(Serialize)]
struct CounterDocument {
    version: u32,
    counters: BTreeMap<TicketKind, u64>,
}

#[derive(Deserialize)]
struct CounterFile {
    #[serde(default)]
    counters: BTreeMap<TicketKind, u64>,
}

/// Ticket operations bound to one guild
#[derive(Clone)]
pub struct TicketDesk {
    counters: Arc<DashMap<TicketKind, u64>>,
    file: Option<Arc<JsonFile>>,
    platform: Arc<dyn Platform>,
    roles: TicketSettings,
}

impl TicketDesk {
    pub fn in_memory(platform: Arc<dyn Platform>, roles: TicketSettings) -> Self {
        Self {
            counters: Arc::new(DashMap::new()),
            file: None,
            platform,
            roles,
        }
    }

    /// Open the desk with counters from `path`; a missing or broken file starts at zero
    pub async fn load(
        path: impl Into<PathBuf>,
        platform: Arc<dyn Platform>,
        roles: TicketSettings,
    ) -> Self {
        let file = JsonFile::new(path);
        let counters = DashMap::new();

        match file.read::<CounterFile>().await {
            Ok(Some(document)) => {
                for (kind, count) in document.counters {
                    counters.insert(kind, count);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to load ticket counters, starting from zero: {e}"),
        }

        Self {
            counters: Arc::new(counters),
            file: Some(Arc::new(file)),
            platform,
            roles,
        }
    }

    /// Support role configured for a kind
    #[must_use]
    pub fn support_role(&self, kind: TicketKind) -> Option<u64> {
        match kind {
            TicketKind::General => self.roles.general_role_id,
            TicketKind::Management => self.roles.management_role_id,
            TicketKind::Internal => self.roles.internal_role_id,
        }
    }

    /// Last number handed out for a kind
    #[must_use]
    pub fn current_number(&self, kind: TicketKind) -> u64 {
        self.counters.get(&kind).map_or(0, |count| *count)
    }

    async fn next_number(&self, kind: TicketKind) -> u64 {
        let number = {
            let mut count = self.counters.entry(kind).or_insert(0);
            *count += 1;
            *count
        };

        if let Some(file) = &self.file {
            let snapshot = || CounterDocument {
                version: SCHEMA_VERSION,
                counters: self
                    .counters
                    .iter()
                    .map(|entry| (*entry.key(), *entry.value()))
                    .collect(),
            };
            if let Err(e) = file.replace_with(snapshot).await {
                warn!("Ticket counter {kind} advanced to {number} but not persisted: {e}");
            }
        }

        number
    }

    /// Open a ticket: private channel visible to the opener and the kind's support role
    ///
    /// # Errors
    /// Returns the platform error if the channel cannot be created. The
    /// sequence number is consumed either way.
    pub async fn open(&self, kind: TicketKind, opener: &str) -> Result<OpenedTicket, PlatformError> {
        let number = self.next_number(kind).await;
        let channel_name = format!("ticket-{kind}-{number:04}");
        let support_role = self.support_role(kind);

        let mut access = vec![
            ChannelAccess::new(AccessTarget::Everyone, AccessLevel::Hidden),
            ChannelAccess::new(AccessTarget::Member(opener.to_string()), AccessLevel::ReadWrite),
        ];
        if let Some(role) = support_role {
            access.push(ChannelAccess::new(AccessTarget::Role(role), AccessLevel::Manage));
        }

        let channel_id = self
            .platform
            .create_channel(ChannelSpec {
                name: channel_name.clone(),
                topic: Some(format!("{} ticket #{number} opened by <@{opener}>", kind.label())),
                access,
            })
            .await?;

        info!("Opened ticket {channel_name} for user {opener}");
        Ok(OpenedTicket {
            kind,
            number,
            channel_id,
            channel_name,
            support_role,
        })
    }

    /// Stop the opener from writing in the ticket
    ///
    /// # Errors
    /// Returns the platform error if the permission cannot be changed.
    pub async fn close(&self, channel_id: u64, opener: &str) -> Result<(), PlatformError> {
        self.platform
            .set_channel_access(
                channel_id,
                ChannelAccess::new(AccessTarget::Member(opener.to_string()), AccessLevel::ReadOnly),
            )
            .await
    }

    /// Let the opener write in the ticket again
    ///
    /// # Errors
    /// Returns the platform error if the permission cannot be changed.
    pub async fn reopen(&self, channel_id: u64, opener: &str) -> Result<(), PlatformError> {
        self.platform
            .set_channel_access(
                channel_id,
                ChannelAccess::new(AccessTarget::Member(opener.to_string()), AccessLevel::ReadWrite),
            )
            .await
    }

    /// Hand the ticket to one staff member: support roles go read-only, the claimer manages
    ///
    /// # Errors
    /// Returns the first platform error encountered.
    pub async fn claim(&self, channel_id: u64, claimer: &str) -> Result<(), PlatformError> {
        let roles = [
            self.roles.general_role_id,
            self.roles.management_role_id,
            self.roles.internal_role_id,
        ];
        for role in roles.into_iter().flatten() {
            self.platform
                .set_channel_access(
                    channel_id,
                    ChannelAccess::new(AccessTarget::Role(role), AccessLevel::ReadOnly),
                )
                .await?;
        }

        self.platform
            .set_channel_access(
                channel_id,
                ChannelAccess::new(AccessTarget::Member(claimer.to_string()), AccessLevel::Manage),
            )
            .await?;
        info!("Ticket channel {channel_id} claimed by {claimer}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::MockPlatform;
    use mockall::predicate::eq;

    fn roles() -> TicketSettings {
        TicketSettings {
            panel_channel_id: None,
            general_role_id: Some(100),
            management_role_id: Some(200),
            internal_role_id: None,
        }
    }

    #[test]
    fn test_kind_parsing() {
        for kind in TicketKind::ALL {
            assert_eq!(kind.to_string().parse::<TicketKind>().unwrap(), kind);
        }
        assert!("billing".parse::<TicketKind>().is_err());
    }

    #[tokio::test]
    async fn test_open_creates_private_channel() {
        let mut platform = MockPlatform::new();
        platform
            .expect_create_channel()
            .withf(|spec| {
                spec.name == "ticket-general-0001"
                    && spec.access
                        == vec![
                            ChannelAccess::new(AccessTarget::Everyone, AccessLevel::Hidden),
                            ChannelAccess::new(
                                AccessTarget::Member("55".to_string()),
                                AccessLevel::ReadWrite,
                            ),
                            ChannelAccess::new(AccessTarget::Role(100), AccessLevel::Manage),
                        ]
            })
            .times(1)
            .returning(|_| Ok(9001));
        let desk = TicketDesk::in_memory(Arc::new(platform), roles());

        let ticket = desk.open(TicketKind::General, "55").await.unwrap();
        assert_eq!(ticket.number, 1);
        assert_eq!(ticket.channel_id, 9001);
        assert_eq!(ticket.support_role, Some(100));
    }

    #[tokio::test]
    async fn test_numbers_are_per_kind() {
        let mut platform = MockPlatform::new();
        platform.expect_create_channel().returning(|_| Ok(1));
        let desk = TicketDesk::in_memory(Arc::new(platform), roles());

        assert_eq!(desk.open(TicketKind::General, "1").await.unwrap().number, 1);
        assert_eq!(desk.open(TicketKind::General, "2").await.unwrap().number, 2);
        let internal = desk.open(TicketKind::Internal, "3").await.unwrap();
        assert_eq!(internal.number, 1);
        assert_eq!(internal.channel_name, "ticket-internal-0001");
        assert!(internal.support_role.is_none());
    }

    #[tokio::test]
    async fn test_failed_open_consumes_number() {
        let mut platform = MockPlatform::new();
        platform
            .expect_create_channel()
            .returning(|_| Err(PlatformError::Other("Missing access".to_string())));
        let desk = TicketDesk::in_memory(Arc::new(platform), roles());

        assert!(desk.open(TicketKind::Management, "1").await.is_err());
        assert_eq!(desk.current_number(TicketKind::Management), 1);
    }

    #[tokio::test]
    async fn test_counters_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.json");

        let mut platform = MockPlatform::new();
        platform.expect_create_channel().returning(|_| Ok(1));
        let platform: Arc<dyn Platform> = Arc::new(platform);

        let desk = TicketDesk::load(&path, Arc::clone(&platform), roles()).await;
        desk.open(TicketKind::General, "1").await.unwrap();
        desk.open(TicketKind::General, "1").await.unwrap();

        let reloaded = TicketDesk::load(&path, platform, roles()).await;
        assert_eq!(reloaded.current_number(TicketKind::General), 2);
        assert_eq!(reloaded.current_number(TicketKind::Internal), 0);
    }

    #[tokio::test]
    async fn test_close_and_reopen() {
        let mut platform = MockPlatform::new();
        platform
            .expect_set_channel_access()
            .with(
                eq(42),
                eq(ChannelAccess::new(AccessTarget::Member("55".to_string()), AccessLevel::ReadOnly)),
            )
            .times(1)
            .returning(|_, _| Ok(()));
        platform
            .expect_set_channel_access()
            .with(
                eq(42),
                eq(ChannelAccess::new(AccessTarget::Member("55".to_string()), AccessLevel::ReadWrite)),
            )
            .times(1)
            .returning(|_, _| Ok(()));
        let desk = TicketDesk::in_memory(Arc::new(platform), roles());

        desk.close(42, "55").await.unwrap();
        desk.reopen(42, "55").await.unwrap();
    }

    #[tokio::test]
    async fn test_claim_locks_support_roles() {
        let mut platform = MockPlatform::new();
        platform
            .expect_set_channel_access()
            .withf(|_, access| {
                matches!(access.target, AccessTarget::Role(100 | 200))
                    && access.level == AccessLevel::ReadOnly
            })
            .times(2)
            .returning(|_, _| Ok(()));
        platform
            .expect_set_channel_access()
            .with(
                eq(42),
                eq(ChannelAccess::new(AccessTarget::Member("7".to_string()), AccessLevel::Manage)),
            )
            .times(1)
            .returning(|_, _| Ok(()));
        let desk = TicketDesk::in_memory(Arc::new(platform), roles());

        desk.claim(42, "7").await.unwrap();
    }
}
