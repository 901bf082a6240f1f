//! Moderation service
//!
//! Mutate the store, persist, count the action, return the result. Storage
//! and stats failures are logged and never fail the call; platform failures
//! are logged and returned.

use crate::MODERATION_TARGET;
use crate::moderation::{MemberSummary, ModerationError, ModerationResult, Platform};
use crate::stats::{StatKind, StatsAggregator, StatsReport};
use crate::store::{Entry, RecordStore};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Longest timeout Discord accepts, 28 days
pub const MAX_TIMEOUT_MINUTES: u64 = 28 * 24 * 60;

/// Defaults applied when a caller leaves something out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationDefaults {
    /// Recorded when a reason is missing or blank
    pub default_reason: String,
    /// Length of a timeout when none is given
    pub timeout: Duration,
}

impl Default for ModerationDefaults {
    fn default() -> Self {
        Self {
            default_reason: "No reason provided".to_string(),
            timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// Result of issuing a strike
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrikeOutcome {
    pub entry: Entry,
    pub total_count: usize,
}

/// The single moderation surface shared by chat commands, automod and the dashboard
#[derive(Clone)]
pub struct ModerationService {
    warnings: RecordStore,
    strikes: RecordStore,
    stats: StatsAggregator,
    platform: Arc<dyn Platform>,
    defaults: ModerationDefaults,
}

impl std::fmt::Debug for ModerationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModerationService")
            .field("warnings", &self.warnings)
            .field("strikes", &self.strikes)
            .field("stats", &self.stats)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl ModerationService {
    pub fn new(
        warnings: RecordStore,
        strikes: RecordStore,
        stats: StatsAggregator,
        platform: Arc<dyn Platform>,
        defaults: ModerationDefaults,
    ) -> Self {
        Self {
            warnings,
            strikes,
            stats,
            platform,
            defaults,
        }
    }

    /// Open the warning, strike and stats files under `data_dir`
    pub async fn load(
        data_dir: &Path,
        platform: Arc<dyn Platform>,
        defaults: ModerationDefaults,
    ) -> Self {
        let warnings = RecordStore::load("warnings", data_dir.join("warnings.json")).await;
        let strikes = RecordStore::load("strikes", data_dir.join("strikes.json")).await;
        let stats = StatsAggregator::load(data_dir.join("stats.json")).await;
        Self::new(warnings, strikes, stats, platform, defaults)
    }

    fn reason_or_default(&self, reason: Option<&str>) -> String {
        reason
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .map_or_else(|| self.defaults.default_reason.clone(), ToString::to_string)
    }

    async fn count_stat(&self, kind: StatKind) {
        if let Err(e) = self.stats.record(kind).await {
            warn!(target: MODERATION_TARGET, kind = %kind, error = %e, "Failed to persist stats");
        }
    }

    async fn append(&self, store: &RecordStore, subject: &str, entry: Entry) -> usize {
        match store.append(subject, entry).await {
            Ok(count) => count,
            Err(e) => {
                error!(
                    target: MODERATION_TARGET,
                    namespace = store.namespace(),
                    subject = %subject,
                    error = %e,
                    "Entry kept in memory but not persisted"
                );
                store.count(subject)
            }
        }
    }

    async fn record_warning(&self, subject: &str, entry: Entry, source: &'static str) -> Entry {
        let total = self.append(&self.warnings, subject, entry.clone()).await;
        info!(
            target: MODERATION_TARGET,
            subject = %subject,
            reason = %entry.reason(),
            source = source,
            total = total,
            event = "warn",
            "Warning recorded"
        );
        self.count_stat(StatKind::Warn).await;
        entry
    }

    /// Warn a subject; a missing reason becomes the default placeholder
    pub async fn warn(&self, subject: &str, reason: Option<&str>) -> Entry {
        let entry = Entry::new(self.reason_or_default(reason));
        self.record_warning(subject, entry, "moderator").await
    }

    /// Warn a subject on behalf of the automod policy
    pub async fn auto_warn(&self, subject: &str, policy_reason: &str) -> Entry {
        let entry = Entry::new(self.reason_or_default(Some(policy_reason)));
        self.record_warning(subject, entry, "automod").await
    }

    #[must_use]
    pub fn list_warnings(&self, subject: &str) -> Vec<Entry> {
        self.warnings.list(subject)
    }

    pub async fn clear_warnings(&self, subject: &str) {
        if let Err(e) = self.warnings.clear(subject).await {
            error!(
                target: MODERATION_TARGET,
                subject = %subject,
                error = %e,
                "Warnings cleared in memory but not persisted"
            );
        }
        info!(target: MODERATION_TARGET, subject = %subject, event = "unwarn", "Warnings cleared");
    }

    /// Strike a subject and report their new strike total
    pub async fn strike(&self, subject: &str, reason: Option<&str>) -> StrikeOutcome {
        let entry = Entry::new(self.reason_or_default(reason));
        let total_count = self.append(&self.strikes, subject, entry.clone()).await;
        info!(
            target: MODERATION_TARGET,
            subject = %subject,
            reason = %entry.reason(),
            total = total_count,
            event = "strike",
            "Strike recorded"
        );
        self.count_stat(StatKind::Warn).await;
        StrikeOutcome { entry, total_count }
    }

    #[must_use]
    pub fn list_strikes(&self, subject: &str) -> Vec<Entry> {
        self.strikes.list(subject)
    }

    pub async fn ban(&self, subject: &str, reason: Option<&str>) -> ModerationResult<()> {
        let reason = self.reason_or_default(reason);
        self.platform
            .ban(subject, &reason)
            .await
            .inspect_err(|e| self.log_platform_failure("ban", subject, e))?;
        info!(target: MODERATION_TARGET, subject = %subject, reason = %reason, event = "ban", "User banned");
        self.count_stat(StatKind::Ban).await;
        Ok(())
    }

    pub async fn unban(&self, subject: &str) -> ModerationResult<()> {
        self.platform
            .unban(subject)
            .await
            .inspect_err(|e| self.log_platform_failure("unban", subject, e))?;
        info!(target: MODERATION_TARGET, subject = %subject, event = "unban", "User unbanned");
        Ok(())
    }

    pub async fn kick(&self, subject: &str, reason: Option<&str>) -> ModerationResult<()> {
        let reason = self.reason_or_default(reason);
        self.platform
            .kick(subject, &reason)
            .await
            .inspect_err(|e| self.log_platform_failure("kick", subject, e))?;
        info!(target: MODERATION_TARGET, subject = %subject, reason = %reason, event = "kick", "User kicked");
        Ok(())
    }

    /// Time a subject out, for the configured default length unless given
    pub async fn timeout(
        &self,
        subject: &str,
        reason: Option<&str>,
        duration: Option<Duration>,
    ) -> ModerationResult<Duration> {
        let reason = self.reason_or_default(reason);
        let duration = duration.unwrap_or(self.defaults.timeout);
        self.platform
            .timeout(subject, Some(duration), &reason)
            .await
            .inspect_err(|e| self.log_platform_failure("timeout", subject, e))?;
        info!(
            target: MODERATION_TARGET,
            subject = %subject,
            reason = %reason,
            duration_secs = duration.as_secs(),
            event = "timeout",
            "User timed out"
        );
        self.count_stat(StatKind::Timeout).await;
        Ok(duration)
    }

    pub async fn untimeout(&self, subject: &str) -> ModerationResult<()> {
        self.platform
            .timeout(subject, None, "Timeout removed")
            .await
            .inspect_err(|e| self.log_platform_failure("untimeout", subject, e))?;
        info!(target: MODERATION_TARGET, subject = %subject, event = "untimeout", "Timeout removed");
        Ok(())
    }

    /// Resolve an id, mention or username to a member
    ///
    /// # Errors
    /// `SubjectNotFound` if nothing matches, `Platform` if the lookup failed.
    pub async fn resolve_subject(&self, query: &str) -> ModerationResult<MemberSummary> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ModerationError::SubjectNotFound(String::new()));
        }

        self.platform
            .find_member(query)
            .await
            .inspect_err(|e| self.log_platform_failure("resolve", query, e))?
            .ok_or_else(|| ModerationError::SubjectNotFound(query.to_string()))
    }

    /// Fetch a subject who is currently a guild member
    ///
    /// # Errors
    /// `SubjectNotFound` if the platform cannot return the member.
    pub async fn fetch_subject(&self, subject: &str) -> ModerationResult<MemberSummary> {
        self.platform.fetch_member(subject).await.map_err(|e| {
            warn!(target: MODERATION_TARGET, subject = %subject, error = %e, "Member lookup failed");
            ModerationError::SubjectNotFound(subject.to_string())
        })
    }

    /// Direct-message a subject; failures (closed DMs) are only logged
    pub async fn notify(&self, subject: &str, text: &str) {
        if let Err(e) = self.platform.direct_message(subject, text).await {
            warn!(target: MODERATION_TARGET, subject = %subject, error = %e, "Could not DM user");
        }
    }

    #[must_use]
    pub fn stats_report(&self) -> StatsReport {
        self.stats.report()
    }

    fn log_platform_failure(&self, action: &str, subject: &str, e: &crate::moderation::PlatformError) {
        error!(
            target: MODERATION_TARGET,
            action = action,
            subject = %subject,
            error = %e,
            "Platform call failed"
        );
    }
}
