//! Roblox account verification
//!
//! Looks a Discord user up in Bloxlink, sets their server nickname to the
//! linked Roblox username, and resets it again on request.

use crate::moderation::Platform;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Bloxlink's public API root
pub const BLOXLINK_API_URL: &str = "https://api.blox.link/v2";

/// Where unverified members are sent to link an account
pub const VERIFY_HELP_URL: &str = "https://blox.link/dashboard/user/verifications/verify";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Bloxlink request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// The Roblox account a Discord user has linked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobloxAccount {
    pub id: String,
    pub username: String,
    pub display_name: String,
}

impl RobloxAccount {
    #[must_use]
    pub fn profile_url(&self) -> String {
        format!("https://www.roblox.com/users/{}/profile", self.id)
    }

    #[must_use]
    pub fn headshot_url(&self) -> String {
        format!(
            "https://www.roblox.com/headshot-thumbnail/image?userId={}&width=420&height=420&format=png",
            self.id
        )
    }

    #[must_use]
    pub fn avatar_url(&self) -> String {
        format!(
            "https://thumbnails.roblox.com/v1/users/avatar?userIds={}&size=720x720&format=Png&isCircular=false",
            self.id
        )
    }
}

/// Read a Bloxlink user lookup body.
///
/// Anything but `"status": "ok"` with a primary account means the user has
/// not linked one.
#[must_use]
pub fn parse_account(body: &Value) -> Option<RobloxAccount> {
    if body.get("status").and_then(Value::as_str) != Some("ok") {
        return None;
    }
    let id = match body.get("primaryAccount")? {
        Value::String(id) if !id.is_empty() => id.clone(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    let text = |key: &str| {
        body.get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
    };
    let username = text("robloxUsername").unwrap_or_else(|| "Unknown".to_string());
    let display_name = text("robloxDisplayName").unwrap_or_else(|| username.clone());
    Some(RobloxAccount {
        id,
        username,
        display_name,
    })
}

/// Where linked accounts are looked up
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountLookup: Send + Sync {
    async fn linked_account(&self, discord_id: &str) -> Result<Option<RobloxAccount>, VerifyError>;
}

/// Bloxlink HTTP client
#[derive(Debug, Clone)]
pub struct BloxlinkClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl BloxlinkClient {
    /// # Errors
    /// Returns `VerifyError::Http` if the HTTP client cannot be initialized.
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, VerifyError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn user_url(&self, discord_id: &str) -> String {
        format!("{}/user/{discord_id}", self.api_url)
    }
}

#[async_trait]
impl AccountLookup for BloxlinkClient {
    async fn linked_account(&self, discord_id: &str) -> Result<Option<RobloxAccount>, VerifyError> {
        let response = self
            .http
            .get(self.user_url(discord_id))
            .header(reqwest::header::AUTHORIZATION, self.api_key.as_str())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            info!("Bloxlink answered {status} for user {discord_id}");
        }
        let body: Value = response.json().await?;
        Ok(parse_account(&body))
    }
}

/// Links a member's nickname to their verified Roblox account
#[derive(Clone)]
pub struct Verifier {
    lookup: Arc<dyn AccountLookup>,
    platform: Arc<dyn Platform>,
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier").finish_non_exhaustive()
    }
}

impl Verifier {
    pub fn new(lookup: Arc<dyn AccountLookup>, platform: Arc<dyn Platform>) -> Self {
        Self { lookup, platform }
    }

    /// Look the member up and rename them after their Roblox account.
    ///
    /// `Ok(None)` means no account is linked. A failed rename is logged and
    /// the account is still returned.
    ///
    /// # Errors
    /// Returns `VerifyError` if the lookup itself fails.
    pub async fn verify(&self, subject: &str) -> Result<Option<RobloxAccount>, VerifyError> {
        let Some(account) = self.lookup.linked_account(subject).await? else {
            info!("User {subject} has no linked Roblox account");
            return Ok(None);
        };
        info!("Verified user {subject} as Roblox account {}", account.id);
        if let Err(e) = self.platform.set_nickname(subject, &account.username).await {
            warn!("Failed to set nickname for {subject}: {e}");
        }
        Ok(Some(account))
    }

    /// Reset the member's nickname; failures are only logged
    pub async fn unverify(&self, subject: &str) {
        info!("Unverifying user {subject}");
        if let Err(e) = self.platform.set_nickname(subject, "").await {
            warn!("Failed to reset nickname for {subject}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::{MockPlatform, PlatformError};
    use mockall::predicate::eq;
    use serde_json::json;

    fn account() -> RobloxAccount {
        RobloxAccount {
            id: "261".to_string(),
            username: "builderman".to_string(),
            display_name: "Builder".to_string(),
        }
    }

    #[test]
    fn test_parse_linked_account() {
        let body = json!({
            "status": "ok",
            "primaryAccount": "261",
            "robloxUsername": "builderman",
            "robloxDisplayName": "Builder",
        });
        assert_eq!(parse_account(&body), Some(account()));

        let numeric = json!({ "status": "ok", "primaryAccount": 261 });
        let parsed = parse_account(&numeric).unwrap();
        assert_eq!(parsed.id, "261");
        assert_eq!(parsed.username, "Unknown");
        assert_eq!(parsed.display_name, "Unknown");

        let no_display = json!({ "status": "ok", "primaryAccount": "1", "robloxUsername": "alice" });
        assert_eq!(parse_account(&no_display).unwrap().display_name, "alice");
    }

    #[test]
    fn test_parse_unlinked_account() {
        assert_eq!(parse_account(&json!({ "status": "error", "error": "not linked" })), None);
        assert_eq!(parse_account(&json!({ "status": "ok" })), None);
        assert_eq!(parse_account(&json!({ "status": "ok", "primaryAccount": null })), None);
        assert_eq!(parse_account(&json!([])), None);
    }

    #[test]
    fn test_account_urls() {
        let account = account();
        assert_eq!(account.profile_url(), "https://www.roblox.com/users/261/profile");
        assert!(account.headshot_url().contains("userId=261"));
        assert!(account.avatar_url().contains("userIds=261"));
    }

    #[test]
    fn test_client_user_url() {
        let client = BloxlinkClient::new("https://api.blox.link/v2/", "key").unwrap();
        assert_eq!(client.user_url("42"), "https://api.blox.link/v2/user/42");
    }

    #[tokio::test]
    async fn test_verify_sets_nickname() {
        let mut lookup = MockAccountLookup::new();
        lookup
            .expect_linked_account()
            .with(eq("42"))
            .returning(|_| Ok(Some(account())));
        let mut platform = MockPlatform::new();
        platform
            .expect_set_nickname()
            .with(eq("42"), eq("builderman"))
            .times(1)
            .returning(|_, _| Ok(()));

        let verifier = Verifier::new(Arc::new(lookup), Arc::new(platform));
        assert_eq!(verifier.verify("42").await.unwrap(), Some(account()));
    }

    #[tokio::test]
    async fn test_verify_survives_rename_failure() {
        let mut lookup = MockAccountLookup::new();
        lookup.expect_linked_account().returning(|_| Ok(Some(account())));
        let mut platform = MockPlatform::new();
        platform
            .expect_set_nickname()
            .returning(|_, _| Err(PlatformError::Other("Missing permissions".to_string())));

        let verifier = Verifier::new(Arc::new(lookup), Arc::new(platform));
        assert_eq!(verifier.verify("42").await.unwrap(), Some(account()));
    }

    #[tokio::test]
    async fn test_unlinked_user_keeps_nickname() {
        let mut lookup = MockAccountLookup::new();
        lookup.expect_linked_account().returning(|_| Ok(None));
        let mut platform = MockPlatform::new();
        platform.expect_set_nickname().never();

        let verifier = Verifier::new(Arc::new(lookup), Arc::new(platform));
        assert_eq!(verifier.verify("42").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unverify_resets_nickname() {
        let mut platform = MockPlatform::new();
        platform
            .expect_set_nickname()
            .with(eq("42"), eq(""))
            .times(1)
            .returning(|_, _| Ok(()));

        let verifier = Verifier::new(Arc::new(MockAccountLookup::new()), Arc::new(platform));
        verifier.unverify("42").await;
    }
}
