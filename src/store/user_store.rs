//! JSON-file backed user store.
//!
//! The whole mapping lives in memory and is rewritten to disk on every `put`.
//! Writes are serialized through one writer lock so records of different
//! users cannot overwrite each other on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

use super::record::UserRecord;
use crate::error::StoreError;

/// Persistent mapping from user id to record.
pub struct UserStore {
    path: PathBuf,
    records: RwLock<BTreeMap<String, UserRecord>>,
    writer: Mutex<()>,
}

impl UserStore {
    /// Load the store from `path`. A missing file yields an empty store;
    /// an unreadable or corrupt file is an error.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str::<BTreeMap<String, UserRecord>>(&raw).map_err(
                |source| StoreError::Corrupt {
                    path: path.clone(),
                    source,
                },
            )?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No user data yet, starting empty");
                BTreeMap::new()
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: path.clone(),
                    source,
                });
            }
        };

        tracing::info!(path = %path.display(), users = records.len(), "User store loaded");

        Ok(Self {
            path,
            records: RwLock::new(records),
            writer: Mutex::new(()),
        })
    }

    /// File backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record for `user_id`, or an empty record if unknown.
    pub async fn get(&self, user_id: i64) -> UserRecord {
        self.records
            .read()
            .await
            .get(&user_id.to_string())
            .cloned()
            .unwrap_or_default()
    }

    /// Whether a record exists for `user_id`.
    pub async fn contains(&self, user_id: i64) -> bool {
        self.records.read().await.contains_key(&user_id.to_string())
    }

    /// Replace the record for `user_id` and rewrite the file.
    ///
    /// The in-memory mapping is updated before the write; if the write fails
    /// memory stays ahead of disk until the next successful `put`.
    pub async fn put(&self, user_id: i64, record: UserRecord) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;

        let snapshot = {
            let mut records = self.records.write().await;
            records.insert(user_id.to_string(), record);
            encode(&records)?
        };

        write_replace(&self.path, &snapshot).await?;
        tracing::debug!(user_id, path = %self.path.display(), "User record persisted");
        Ok(())
    }

    /// Snapshot of every known user id.
    pub async fn all_user_ids(&self) -> Vec<String> {
        self.records.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

/// Pretty-print with four-space indentation; non-ASCII stays literal.
fn encode(records: &BTreeMap<String, UserRecord>) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    records.serialize(&mut ser)?;
    Ok(buf)
}

/// Write to a sibling temp file, then rename over the target.
async fn write_replace(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let write_err = |source: std::io::Error| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    Ok(())
}
