//! Daily moderation statistics
//!
//! Counts warn / timeout / ban actions per calendar day for the dashboard
//! chart, persisted with the same snapshot discipline as the record stores.

use crate::store::{JsonFile, SCHEMA_VERSION, StorageResult};
use chrono::{Local, NaiveDate};
use dashmap::DashMap;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Kinds of action that are counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatKind {
    #[display("warn")]
    Warn,
    #[display("timeout")]
    Timeout,
    #[display("ban")]
    Ban,
}

/// Counters for a single day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bucket {
    pub warn: u64,
    pub timeout: u64,
    pub ban: u64,
}

impl Bucket {
    fn increment(&mut self, kind: StatKind) {
        match kind {
            StatKind::Warn => self.warn += 1,
            StatKind::Timeout => self.timeout += 1,
            StatKind::Ban => self.ban += 1,
        }
    }
}

/// Chart-ready report, all sequences aligned with `labels`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    pub labels: Vec<String>,
    pub warns: Vec<u64>,
    pub timeouts: Vec<u64>,
    pub bans: Vec<u64>,
}

#[derive(Serialize)]
struct StatsDocument {
    version: u32,
    days: BTreeMap<String, Bucket>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatsFile {
    Versioned {
        #[allow(unused)]
        version: u32,
        days: BTreeMap<String, Bucket>,
    },
    Legacy(BTreeMap<String, Bucket>),
}

/// Per-day action counters
#[derive(Clone)]
pub struct StatsAggregator {
    buckets: Arc<DashMap<String, Bucket>>,
    file: Option<Arc<JsonFile>>,
}

impl std::fmt::Debug for StatsAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsAggregator")
            .field("days", &self.buckets.len())
            .field("file", &self.file.as_ref().map(|file| file.path()))
            .finish()
    }
}

impl StatsAggregator {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            file: None,
        }
    }

    /// Load counters from disk; a missing or broken file starts empty
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let file = JsonFile::new(path);
        let buckets = DashMap::new();

        match file.read::<StatsFile>().await {
            Ok(Some(StatsFile::Versioned { days, .. } | StatsFile::Legacy(days))) => {
                for (day, bucket) in days {
                    buckets.insert(day, bucket);
                }
                info!("Loaded stats for {} days", buckets.len());
            }
            Ok(None) => info!("No stats file at {}, starting empty", file.path().display()),
            Err(e) => warn!("Failed to load stats, starting empty: {e}"),
        }

        Self {
            buckets: Arc::new(buckets),
            file: Some(Arc::new(file)),
        }
    }

    /// Count one action against today's bucket (process-local date)
    ///
    /// # Errors
    /// Returns a `StorageError` if the counters cannot be persisted; the
    /// increment itself is kept.
    pub async fn record(&self, kind: StatKind) -> StorageResult<()> {
        self.record_on(kind, Local::now().date_naive()).await
    }

    /// Count one action against the bucket for `date`
    ///
    /// # Errors
    /// Returns a `StorageError` if the counters cannot be persisted.
    pub async fn record_on(&self, kind: StatKind, date: NaiveDate) -> StorageResult<()> {
        let key = date.format("%Y-%m-%d").to_string();
        self.buckets.entry(key).or_default().increment(kind);
        self.save().await
    }

    /// Counters for a single day, zeroed if nothing was recorded
    #[must_use]
    pub fn bucket(&self, date: NaiveDate) -> Bucket {
        self.buckets
            .get(&date.format("%Y-%m-%d").to_string())
            .map(|bucket| *bucket)
            .unwrap_or_default()
    }

    /// Build the chart report, days sorted chronologically
    #[must_use]
    pub fn report(&self) -> StatsReport {
        let days: BTreeMap<String, Bucket> = self
            .buckets
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        let mut report = StatsReport::default();
        for (day, bucket) in days {
            report.labels.push(day);
            report.warns.push(bucket.warn);
            report.timeouts.push(bucket.timeout);
            report.bans.push(bucket.ban);
        }
        report
    }

    /// Write every bucket to disk. A no-op without a backing file.
    ///
    /// # Errors
    /// Returns a `StorageError` if serialization or the file write fails.
    pub async fn save(&self) -> StorageResult<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };

        file.replace_with(|| StatsDocument {
            version: SCHEMA_VERSION,
            days: self
                .buckets
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        })
        .await
    }
}
