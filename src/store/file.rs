//! JSON file backing for the stores
//!
//! Writes go to a sibling `.tmp` file which is then renamed over the target,
//! so a crash mid-write leaves the previous snapshot intact.

use crate::store::{StorageError, StorageResult};
use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// A single JSON document on disk with serialized writers
#[derive(Debug)]
pub struct JsonFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the document. A missing file is `Ok(None)`.
    ///
    /// # Errors
    /// Returns `StorageError::Io` if the file exists but cannot be read, or
    /// `StorageError::Corrupt` if it does not parse as `T`.
    pub async fn read<T: DeserializeOwned>(&self) -> StorageResult<Option<T>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|source| StorageError::Corrupt {
                    path: self.path.clone(),
                    source,
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(&self.path, e)),
        }
    }

    /// Replace the document with a snapshot taken while holding the write lock.
    ///
    /// Taking the snapshot under the lock means the file written last always
    /// contains every mutation that completed before it.
    ///
    /// # Errors
    /// Returns an error if serialization fails or the file cannot be written.
    pub async fn replace_with<T, F>(&self, snapshot: F) -> StorageResult<()>
    where
        T: Serialize,
        F: FnOnce() -> T,
    {
        let _guard = self.write_lock.lock().await;
        let json = serde_json::to_string_pretty(&snapshot())?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StorageError::io(parent, e))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StorageError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StorageError::io(&self.path, e))?;

        Ok(())
    }
}
