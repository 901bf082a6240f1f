use std::{ops::Deref, sync::Arc};

use crate::config::Settings;
use crate::moderation::{ModerationService, Platform};
use crate::policy::Policy;
use crate::stats::StatsAggregator;
use crate::store::RecordStore;
use crate::tickets::TicketDesk;
use crate::verify::{BloxlinkClient, Verifier};
use poise::serenity_prelude::prelude::TypeMapKey;
use tracing::{error, info};

/// Ticket counter file name inside the data directory
pub const TICKETS_FILE: &str = "tickets.json";

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

// Implement TypeMapKey for Data to allow storing it in Serenity's data map
impl TypeMapKey for Data {
    type Value = Data;
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("settings", &self.settings)
            .field("moderation", &self.moderation)
            .field("policy", &self.policy)
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    /// Build bot state that never touches the disk
    #[must_use]
    pub fn in_memory(settings: Settings, platform: Arc<dyn Platform>) -> Self {
        Self(Arc::new(DataInner::in_memory(settings, platform)))
    }

    /// Load the stores under `settings.data_dir`
    pub async fn load(settings: Settings, platform: Arc<dyn Platform>) -> Self {
        Self(Arc::new(DataInner::load(settings, platform).await))
    }

    /// Whether a member holding `roles` may use staff features
    #[must_use]
    pub fn is_staff(&self, roles: &[u64]) -> bool {
        self.settings.is_staff(roles)
    }
}

/// Shared state behind [`Data`]
pub struct DataInner {
    pub settings: Settings,
    pub moderation: Arc<ModerationService>,
    pub tickets: TicketDesk,
    pub policy: Policy,
    /// Present only when a Bloxlink API key is configured
    pub verifier: Option<Verifier>,
}

fn verifier(settings: &Settings, platform: &Arc<dyn Platform>) -> Option<Verifier> {
    let Some(api_key) = settings.verification.api_key.as_deref() else {
        info!("BLOXLINK_API_KEY not set; /verify is disabled");
        return None;
    };
    match BloxlinkClient::new(settings.verification.api_url.as_str(), api_key) {
        Ok(client) => Some(Verifier::new(Arc::new(client), Arc::clone(platform))),
        Err(e) => {
            error!("Failed to build the Bloxlink client: {e}");
            None
        }
    }
}

impl DataInner {
    fn in_memory(settings: Settings, platform: Arc<dyn Platform>) -> Self {
        let moderation = ModerationService::new(
            RecordStore::in_memory("warnings"),
            RecordStore::in_memory("strikes"),
            StatsAggregator::in_memory(),
            Arc::clone(&platform),
            settings.moderation_defaults(),
        );
        let verifier = verifier(&settings, &platform);
        let tickets = TicketDesk::in_memory(platform, settings.tickets.clone());
        Self {
            policy: settings.policy(),
            verifier,
            moderation: Arc::new(moderation),
            tickets,
            settings,
        }
    }

    async fn load(settings: Settings, platform: Arc<dyn Platform>) -> Self {
        let data_dir = settings.data_dir.clone();
        let moderation = ModerationService::load(
            &data_dir,
            Arc::clone(&platform),
            settings.moderation_defaults(),
        )
        .await;
        let verifier = verifier(&settings, &platform);
        let tickets = TicketDesk::load(
            data_dir.join(TICKETS_FILE),
            platform,
            settings.tickets.clone(),
        )
        .await;
        Self {
            policy: settings.policy(),
            verifier,
            moderation: Arc::new(moderation),
            tickets,
            settings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::MockPlatform;

    fn settings() -> Settings {
        Settings {
            staff_roles: vec![10, 20],
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_in_memory_data() {
        let data = Data::in_memory(settings(), Arc::new(MockPlatform::new()));
        assert!(data.moderation.list_warnings("1").is_empty());
        assert_eq!(data.policy.emoji_threshold, 8);
        assert!(data.is_staff(&[5, 20]));
        assert!(!data.is_staff(&[5]));
    }

    #[tokio::test]
    async fn test_load_uses_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings();
        settings.data_dir = dir.path().to_path_buf();

        let data = Data::load(settings.clone(), Arc::new(MockPlatform::new())).await;
        data.moderation.warn("42", Some("spam")).await;
        assert!(dir.path().join("warnings.json").exists());

        let reloaded = Data::load(settings, Arc::new(MockPlatform::new())).await;
        assert_eq!(reloaded.moderation.list_warnings("42").len(), 1);
    }

    #[test]
    fn test_verifier_needs_api_key() {
        let data = Data::in_memory(settings(), Arc::new(MockPlatform::new()));
        assert!(data.verifier.is_none());

        let mut settings = settings();
        settings.verification.api_key = Some("key".to_string());
        let data = Data::in_memory(settings, Arc::new(MockPlatform::new()));
        assert!(data.verifier.is_some());
    }

    #[test]
    fn test_data_debug_impl() {
        let data = Data::in_memory(settings(), Arc::new(MockPlatform::new()));
        let debug_output = format!("{data:?}");
        assert!(debug_output.contains("Data"));
        assert!(debug_output.contains("settings"));
        assert!(debug_output.contains("moderation"));
    }
}
