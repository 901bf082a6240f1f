//! Discord implementation of the platform seam over serenity's HTTP client

use crate::moderation::{
    AccessLevel, AccessTarget, ChannelAccess, ChannelSpec, MemberSummary, Platform, PlatformError,
};
use chrono::Utc;
use poise::serenity_prelude::{
    ChannelId, ChannelType, CreateChannel, CreateMessage, EditMember, GuildId, Http,
    PermissionOverwrite, PermissionOverwriteType, Permissions, RoleId, UserId,
};
use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Maximum members fetched when resolving a username
const MEMBER_SEARCH_LIMIT: u64 = 1000;

/// Parse a subject string into a Discord user id.
///
/// Accepts a bare snowflake or a mention (`<@123>` / `<@!123>`).
///
/// # Errors
/// Returns `PlatformError::InvalidSubject` for anything else, including `0`.
pub fn parse_user_id(subject: &str) -> Result<UserId, PlatformError> {
    let trimmed = subject.trim();
    let raw = trimmed
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map_or(trimmed, |inner| inner.trim_start_matches('!'));

    raw.parse::<NonZeroU64>()
        .map(|id| UserId::new(id.get()))
        .map_err(|_| PlatformError::InvalidSubject(subject.to_string()))
}

fn non_zero(id: u64, what: &str) -> Result<u64, PlatformError> {
    if id == 0 {
        Err(PlatformError::InvalidId(format!("{what} id 0")))
    } else {
        Ok(id)
    }
}

/// Allow / deny permission sets for an access level
#[must_use]
pub(crate) fn level_permissions(level: AccessLevel) -> (Permissions, Permissions) {
    let read = Permissions::VIEW_CHANNEL | Permissions::READ_MESSAGE_HISTORY;
    match level {
        AccessLevel::Hidden => (Permissions::empty(), Permissions::VIEW_CHANNEL),
        AccessLevel::ReadOnly => (read, Permissions::SEND_MESSAGES),
        AccessLevel::ReadWrite => (read | Permissions::SEND_MESSAGES, Permissions::empty()),
        AccessLevel::Manage => (
            read | Permissions::SEND_MESSAGES | Permissions::MANAGE_MESSAGES,
            Permissions::empty(),
        ),
    }
}

/// Platform adapter bound to a single guild
#[derive(Clone)]
pub struct SerenityPlatform {
    http: Arc<Http>,
    guild_id: GuildId,
}

impl SerenityPlatform {
    pub fn new(http: Arc<Http>, guild_id: GuildId) -> Self {
        Self { http, guild_id }
    }

    fn overwrite(&self, access: &ChannelAccess) -> Result<PermissionOverwrite, PlatformError> {
        let kind = match &access.target {
            AccessTarget::Everyone => PermissionOverwriteType::Role(RoleId::new(self.guild_id.get())),
            AccessTarget::Role(id) => PermissionOverwriteType::Role(RoleId::new(non_zero(*id, "role")?)),
            AccessTarget::Member(subject) => PermissionOverwriteType::Member(parse_user_id(subject)?),
        };
        let (allow, deny) = level_permissions(access.level);
        Ok(PermissionOverwrite { allow, deny, kind })
    }
}

#[async_trait::async_trait]
impl Platform for SerenityPlatform {
    async fn ban(&self, subject: &str, reason: &str) -> Result<(), PlatformError> {
        let user_id = parse_user_id(subject)?;
        info!("Banning user {user_id} in guild {}", self.guild_id);
        self.guild_id
            .ban_with_reason(self.http.as_ref(), user_id, 0, reason)
            .await?;
        Ok(())
    }

    async fn unban(&self, subject: &str) -> Result<(), PlatformError> {
        let user_id = parse_user_id(subject)?;
        info!("Unbanning user {user_id} in guild {}", self.guild_id);
        self.guild_id.unban(self.http.as_ref(), user_id).await?;
        Ok(())
    }

    async fn kick(&self, subject: &str, reason: &str) -> Result<(), PlatformError> {
        let user_id = parse_user_id(subject)?;
        info!("Kicking user {user_id} from guild {}", self.guild_id);
        self.guild_id
            .kick_with_reason(self.http.as_ref(), user_id, reason)
            .await?;
        Ok(())
    }

    async fn timeout(
        &self,
        subject: &str,
        duration: Option<Duration>,
        reason: &str,
    ) -> Result<(), PlatformError> {
        let user_id = parse_user_id(subject)?;

        let builder = match duration {
            Some(duration) => {
                let length = chrono::Duration::from_std(duration)
                    .map_err(|e| PlatformError::Other(format!("Invalid timeout length: {e}")))?;
                let until = Utc::now()
                    .checked_add_signed(length)
                    .ok_or_else(|| PlatformError::Other("Timeout length is out of range".to_string()))?;
                info!("Timing out user {user_id} until {until}");
                EditMember::new().disable_communication_until_datetime(until.into())
            }
            None => {
                info!("Removing timeout from user {user_id}");
                EditMember::new().enable_communication()
            }
        };

        self.guild_id
            .edit_member(self.http.as_ref(), user_id, builder.audit_log_reason(reason))
            .await?;
        Ok(())
    }

    async fn fetch_member(&self, subject: &str) -> Result<MemberSummary, PlatformError> {
        let user_id = parse_user_id(subject)?;
        let member = self.guild_id.member(self.http.as_ref(), user_id).await?;
        Ok(MemberSummary {
            id: member.user.id.to_string(),
            username: member.user.name.clone(),
        })
    }

    async fn find_member(&self, query: &str) -> Result<Option<MemberSummary>, PlatformError> {
        if let Ok(user_id) = parse_user_id(query) {
            if let Ok(user) = user_id.to_user(self.http.as_ref()).await {
                return Ok(Some(MemberSummary {
                    id: user.id.to_string(),
                    username: user.name,
                }));
            }
        }

        let members = self
            .guild_id
            .members(self.http.as_ref(), Some(MEMBER_SEARCH_LIMIT), None::<UserId>)
            .await?;

        let found = members.into_iter().find(|member| {
            member.user.name.eq_ignore_ascii_case(query)
                || member.user.tag().eq_ignore_ascii_case(query)
        });

        Ok(found.map(|member| MemberSummary {
            id: member.user.id.to_string(),
            username: member.user.name,
        }))
    }

    async fn direct_message(&self, subject: &str, text: &str) -> Result<(), PlatformError> {
        let user_id = parse_user_id(subject)?;
        user_id
            .direct_message(self.http.as_ref(), CreateMessage::new().content(text))
            .await?;
        Ok(())
    }

    async fn set_nickname(&self, subject: &str, nickname: &str) -> Result<(), PlatformError> {
        let user_id = parse_user_id(subject)?;
        info!("Setting nickname of user {user_id} to {nickname:?}");
        self.guild_id
            .edit_member(self.http.as_ref(), user_id, EditMember::new().nickname(nickname))
            .await?;
        Ok(())
    }

    async fn create_channel(&self, spec: ChannelSpec) -> Result<u64, PlatformError> {
        let overwrites = spec
            .access
            .iter()
            .map(|access| self.overwrite(access))
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = CreateChannel::new(spec.name.as_str())
            .kind(ChannelType::Text)
            .permissions(overwrites);
        if let Some(topic) = &spec.topic {
            builder = builder.topic(topic.as_str());
        }

        let channel = self
            .guild_id
            .create_channel(self.http.as_ref(), builder)
            .await?;
        info!("Created channel {} ({}) in guild {}", channel.name, channel.id, self.guild_id);
        Ok(channel.id.get())
    }

    async fn set_channel_access(
        &self,
        channel_id: u64,
        access: ChannelAccess,
    ) -> Result<(), PlatformError> {
        let channel_id = ChannelId::new(non_zero(channel_id, "channel")?);
        let overwrite = self.overwrite(&access)?;
        channel_id
            .create_permission(self.http.as_ref(), overwrite)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_id() {
        assert_eq!(parse_user_id("1234").unwrap(), UserId::new(1234));
        assert_eq!(parse_user_id(" 1234 ").unwrap(), UserId::new(1234));
        assert_eq!(parse_user_id("<@1234>").unwrap(), UserId::new(1234));
        assert_eq!(parse_user_id("<@!1234>").unwrap(), UserId::new(1234));

        assert!(parse_user_id("0").is_err());
        assert!(parse_user_id("someone").is_err());
        assert!(parse_user_id("<@abc>").is_err());
        assert!(parse_user_id("").is_err());
    }

    #[test]
    fn test_level_permissions() {
        let (allow, deny) = level_permissions(AccessLevel::Hidden);
        assert!(allow.is_empty());
        assert!(deny.contains(Permissions::VIEW_CHANNEL));

        let (allow, deny) = level_permissions(AccessLevel::ReadOnly);
        assert!(allow.contains(Permissions::VIEW_CHANNEL));
        assert!(deny.contains(Permissions::SEND_MESSAGES));

        let (allow, deny) = level_permissions(AccessLevel::ReadWrite);
        assert!(allow.contains(Permissions::SEND_MESSAGES));
        assert!(!allow.contains(Permissions::MANAGE_MESSAGES));
        assert!(deny.is_empty());

        let (allow, _) = level_permissions(AccessLevel::Manage);
        assert!(allow.contains(Permissions::MANAGE_MESSAGES));
    }

    #[test]
    fn test_overwrite_targets() {
        let platform = SerenityPlatform::new(Arc::new(Http::new("token")), GuildId::new(77));

        let everyone = platform
            .overwrite(&ChannelAccess::new(AccessTarget::Everyone, AccessLevel::Hidden))
            .unwrap();
        assert_eq!(everyone.kind, PermissionOverwriteType::Role(RoleId::new(77)));

        let member = platform
            .overwrite(&ChannelAccess::new(
                AccessTarget::Member("55".to_string()),
                AccessLevel::ReadWrite,
            ))
            .unwrap();
        assert_eq!(member.kind, PermissionOverwriteType::Member(UserId::new(55)));

        let zero_role =
            platform.overwrite(&ChannelAccess::new(AccessTarget::Role(0), AccessLevel::Manage));
        assert!(matches!(zero_role, Err(PlatformError::InvalidId(_))));
    }

    #[tokio::test]
    async fn test_timeout_past_calendar_range() {
        let platform = SerenityPlatform::new(Arc::new(Http::new("token")), GuildId::new(77));

        let result = platform
            .timeout("5", Some(Duration::from_secs(60_000_000_000_000)), "x")
            .await;
        assert!(matches!(result, Err(PlatformError::Other(_))));
    }
}
