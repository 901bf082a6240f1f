//! Per-subject record store
//!
//! This module provides the keyed entry-list store behind warnings and strikes.

use crate::store::{Entry, JsonFile, SCHEMA_VERSION, StorageResult};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// On-disk document written by [`RecordStore::save`]
#[derive(Serialize)]
struct RecordDocument {
    version: u32,
    subjects: BTreeMap<String, Vec<Entry>>,
}

/// Every document shape [`RecordStore::load`] accepts
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordFile {
    Versioned {
        version: u32,
        subjects: BTreeMap<String, Vec<Entry>>,
    },
    Legacy(BTreeMap<String, Vec<Entry>>),
}

/// Store mapping a subject id to its ordered list of entries
#[derive(Clone)]
pub struct RecordStore {
    /// Name used in logs ("warnings", "strikes")
    namespace: &'static str,
    records: Arc<DashMap<String, Vec<Entry>>>,
    file: Option<Arc<JsonFile>>,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("namespace", &self.namespace)
            .field("subjects", &self.records.len())
            .field("file", &self.file.as_ref().map(|file| file.path()))
            .finish()
    }
}

impl RecordStore {
    /// Create a store with no backing file
    #[must_use]
    pub fn in_memory(namespace: &'static str) -> Self {
        Self {
            namespace,
            records: Arc::new(DashMap::new()),
            file: None,
        }
    }

    /// Load a store from its JSON file.
    ///
    /// A missing, unreadable or corrupt file yields an empty store; the
    /// problem is logged and the next save replaces the file.
    pub async fn load(namespace: &'static str, path: impl Into<PathBuf>) -> Self {
        let file = JsonFile::new(path);
        let records = DashMap::new();

        match file.read::<RecordFile>().await {
            Ok(Some(document)) => {
                let subjects = match document {
                    RecordFile::Versioned { version, subjects } => {
                        if version > SCHEMA_VERSION {
                            warn!(
                                "{namespace} file {} has schema version {version}, newer than {SCHEMA_VERSION}",
                                file.path().display()
                            );
                        }
                        subjects
                    }
                    RecordFile::Legacy(subjects) => {
                        info!("Upgrading unversioned {namespace} file on next save");
                        subjects
                    }
                };
                for (subject, entries) in subjects {
                    records.insert(subject, entries);
                }
                info!(
                    "Loaded {} {namespace} subjects from {}",
                    records.len(),
                    file.path().display()
                );
            }
            Ok(None) => {
                info!(
                    "No {namespace} file at {}, starting empty",
                    file.path().display()
                );
            }
            Err(e) => {
                warn!("Failed to load {namespace}, starting empty: {e}");
            }
        }

        Self {
            namespace,
            records: Arc::new(records),
            file: Some(Arc::new(file)),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// Append an entry for a subject, then persist the whole store.
    ///
    /// Returns the subject's entry count after the append.
    ///
    /// # Errors
    /// Returns a `StorageError` if persisting fails. The in-memory append is
    /// kept regardless.
    pub async fn append(&self, subject: &str, entry: Entry) -> StorageResult<usize> {
        let count = {
            let mut entries = self.records.entry(subject.to_string()).or_default();
            entries.push(entry);
            entries.len()
        };
        self.save().await?;
        Ok(count)
    }

    /// Entries for a subject, oldest first. Empty if the subject has no history.
    #[must_use]
    pub fn list(&self, subject: &str) -> Vec<Entry> {
        self.records
            .get(subject)
            .map(|entries| entries.value().clone())
            .unwrap_or_default()
    }

    /// Number of entries recorded for a subject
    #[must_use]
    pub fn count(&self, subject: &str) -> usize {
        self.records.get(subject).map_or(0, |entries| entries.len())
    }

    /// Reset a subject's entries to empty, keeping the key, then persist.
    ///
    /// # Errors
    /// Returns a `StorageError` if persisting fails. The in-memory clear is
    /// kept regardless.
    pub async fn clear(&self, subject: &str) -> StorageResult<()> {
        self.records.insert(subject.to_string(), Vec::new());
        self.save().await
    }

    /// Whether the store has ever seen this subject (even if now cleared)
    #[cfg(test)]
    fn contains(&self, subject: &str) -> bool {
        self.records.contains_key(subject)
    }

    /// Write the full store to its file. A no-op for in-memory stores.
    ///
    /// # Errors
    /// Returns a `StorageError` if serialization or the file write fails.
    pub async fn save(&self) -> StorageResult<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };

        file.replace_with(|| RecordDocument {
            version: SCHEMA_VERSION,
            subjects: self
                .records
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_subject_has_no_history() {
        let store = RecordStore::in_memory("warnings");
        assert!(store.list("nobody").is_empty());
        assert_eq!(store.count("nobody"), 0);
        assert!(!store.contains("nobody"));
    }

    #[tokio::test]
    async fn test_append_preserves_call_order() {
        let store = RecordStore::in_memory("warnings");

        for (i, reason) in ["first", "second", "third"].iter().enumerate() {
            let count = store.append("U1", Entry::new(*reason)).await.unwrap();
            assert_eq!(count, i + 1);
        }

        let reasons: Vec<_> = store
            .list("U1")
            .iter()
            .map(|entry| entry.reason().to_string())
            .collect();
        assert_eq!(reasons, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_clear_keeps_key() {
        let store = RecordStore::in_memory("warnings");
        store.append("U1", Entry::new("one")).await.unwrap();
        store.append("U1", Entry::new("two")).await.unwrap();

        store.clear("U1").await.unwrap();
        assert!(store.list("U1").is_empty());
        assert!(store.contains("U1"));

        let count = store.append("U1", Entry::new("three")).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_subjects_are_independent() {
        let store = RecordStore::in_memory("strikes");
        store.append("U1", Entry::new("a")).await.unwrap();
        store.append("U2", Entry::new("b")).await.unwrap();
        store.clear("U1").await.unwrap();

        assert_eq!(store.count("U1"), 0);
        assert_eq!(store.count("U2"), 1);
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warnings.json");

        let store = RecordStore::load("warnings", &path).await;
        store.append("42", Entry::new("Spamming")).await.unwrap();
        store.append("42", Entry::new("Links")).await.unwrap();
        store.clear("7").await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"version\": 1"));
        assert!(raw.contains("\"subjects\""));

        let reloaded = RecordStore::load("warnings", &path).await;
        assert_eq!(reloaded.list("42"), store.list("42"));
        assert!(reloaded.contains("7"));
        assert!(reloaded.list("7").is_empty());
    }

    #[tokio::test]
    async fn test_load_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warnings.json");
        std::fs::write(
            &path,
            r#"{
  "111": [{ "reason": "Posting non-GIF links", "date": "2024-03-01T10:00:00.000Z" }],
  "222": ["No reason", "Spam"]
}"#,
        )
        .unwrap();

        let store = RecordStore::load("warnings", &path).await;
        assert_eq!(store.count("111"), 1);
        assert_eq!(store.list("111")[0].reason(), "Posting non-GIF links");
        assert_eq!(store.count("222"), 2);
        assert_eq!(store.list("222")[1].reason(), "Spam");
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warnings.json");
        std::fs::write(&path, "[[[").unwrap();

        let store = RecordStore::load("warnings", &path).await;
        assert!(store.list("111").is_empty());

        // The next mutation rewrites the file as a valid document
        store.append("111", Entry::new("fresh")).await.unwrap();
        let reloaded = RecordStore::load("warnings", &path).await;
        assert_eq!(reloaded.count("111"), 1);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the rename fail
        let path = dir.path().join("warnings.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupant"), "x").unwrap();

        let store = RecordStore::load("warnings", &path).await;
        let result = store.append("U1", Entry::new("kept")).await;

        assert!(result.is_err());
        assert_eq!(store.count("U1"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_all_land_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strikes.json");
        let store = RecordStore::load("strikes", &path).await;

        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .append("U1", Entry::new(format!("strike {i}")))
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let reloaded = RecordStore::load("strikes", &path).await;
        assert_eq!(reloaded.count("U1"), 16);
    }
}
