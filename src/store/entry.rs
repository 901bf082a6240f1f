use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One timestamped reason recorded against a subject.
///
/// Entries are immutable once created; there are no setters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredEntry")]
pub struct Entry {
    reason: String,
    timestamp: DateTime<Utc>,
}

impl Entry {
    /// Create an entry stamped with the current time
    pub fn new(reason: impl Into<String>) -> Self {
        Self::at(reason, Utc::now())
    }

    /// Create an entry with an explicit timestamp
    pub fn at(reason: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            reason: reason.into(),
            timestamp,
        }
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Display for Entry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({})",
            self.reason,
            self.timestamp.format("%Y-%m-%d %H:%M UTC")
        )
    }
}

/// Shapes an entry may take on disk.
///
/// Older files stored either `{reason, date}` objects or bare reason strings.
/// Bare strings carry no time, so they load with the Unix epoch.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Full {
        reason: String,
        #[serde(alias = "date")]
        timestamp: DateTime<Utc>,
    },
    Bare(String),
}

impl From<StoredEntry> for Entry {
    fn from(stored: StoredEntry) -> Self {
        match stored {
            StoredEntry::Full { reason, timestamp } => Self { reason, timestamp },
            StoredEntry::Bare(reason) => Self {
                reason,
                timestamp: DateTime::UNIX_EPOCH,
            },
        }
    }
}
