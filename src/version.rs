//! Append-only version history per schema metadata id
//!
//! Each metadata id owns one history guarded by its own `RwLock`. Appending
//! holds the write lock across the compatibility gate, the durable write and the
//! in-memory push, so version numbers follow the order in which appends commit
//! and no reader ever sees a half-applied history.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::error::{RegistryError, Result};
use crate::storage::{read_json_dir, read_lock, write_json_new, write_lock};

/// One accepted schema body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Owning schema metadata
    pub metadata_id: u64,
    /// 1-based, gap-free version number
    pub version: u32,
    /// Schema body as submitted
    pub body: String,
    /// SHA256 of the body
    pub fingerprint: Checksum,
    /// When this version was committed
    pub created_at: DateTime<Utc>,
}

type History = Arc<RwLock<Vec<SchemaVersion>>>;

/// Stores the version histories of all schemas
pub struct VersionStore {
    dir: PathBuf,
    histories: RwLock<HashMap<u64, History>>,
}

impl VersionStore {
    /// Open the store rooted at `dir`, loading every persisted version
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let mut histories = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(metadata_id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<u64>().ok())
            else {
                continue;
            };
            if !path.is_dir() {
                continue;
            }

            let mut versions: Vec<SchemaVersion> = read_json_dir(&path)?;
            versions.sort_by_key(|v| v.version);
            for (expected, v) in (1u32..).zip(&versions) {
                if v.version != expected || v.metadata_id != metadata_id {
                    return Err(RegistryError::Corrupt(format!(
                        "version history of metadata {} expected version {} but found {}",
                        metadata_id, expected, v.version
                    )));
                }
                if !v.fingerprint.verify(v.body.as_bytes()) {
                    return Err(RegistryError::Corrupt(format!(
                        "version {} of metadata {} does not match its fingerprint",
                        v.version, metadata_id
                    )));
                }
            }
            tracing::debug!(metadata_id, versions = versions.len(), "Loaded version history");
            histories.insert(metadata_id, Arc::new(RwLock::new(versions)));
        }

        Ok(Self {
            dir,
            histories: RwLock::new(histories),
        })
    }

    fn history(&self, metadata_id: u64) -> Option<History> {
        read_lock(&self.histories).get(&metadata_id).cloned()
    }

    fn history_or_create(&self, metadata_id: u64) -> History {
        if let Some(history) = self.history(metadata_id) {
            return history;
        }
        write_lock(&self.histories)
            .entry(metadata_id)
            .or_default()
            .clone()
    }

    fn version_path(&self, metadata_id: u64, version: u32) -> PathBuf {
        self.dir
            .join(metadata_id.to_string())
            .join(format!("{}.json", version))
    }

    /// Append `body` as the next version if `gate` accepts the current history.
    ///
    /// A rejected candidate leaves the history untouched and consumes no
    /// version number.
    pub fn append<F>(&self, metadata_id: u64, body: &str, gate: F) -> Result<SchemaVersion>
    where
        F: FnOnce(&[SchemaVersion]) -> Result<()>,
    {
        let history = self.history_or_create(metadata_id);
        let mut versions = write_lock(&history);

        gate(&versions)?;

        let next = match versions.last() {
            Some(latest) => latest.version.checked_add(1).ok_or_else(|| {
                RegistryError::InvalidInput(format!(
                    "metadata {} has exhausted its version numbers",
                    metadata_id
                ))
            })?,
            None => 1,
        };

        let record = SchemaVersion {
            metadata_id,
            version: next,
            body: body.to_string(),
            fingerprint: Checksum::from_text(body),
            created_at: Utc::now(),
        };
        write_json_new(&self.version_path(metadata_id, next), &record)?;
        versions.push(record.clone());

        Ok(record)
    }

    pub fn get(&self, metadata_id: u64, version: u32) -> Option<SchemaVersion> {
        let history = self.history(metadata_id)?;
        let versions = read_lock(&history);
        // versions are dense and 1-based
        let index = usize::try_from(version.checked_sub(1)?).ok()?;
        versions.get(index).cloned()
    }

    pub fn latest(&self, metadata_id: u64) -> Option<SchemaVersion> {
        let history = self.history(metadata_id)?;
        let versions = read_lock(&history);
        versions.last().cloned()
    }

    /// All versions in ascending order
    pub fn list(&self, metadata_id: u64) -> Vec<SchemaVersion> {
        self.history(metadata_id)
            .map(|history| read_lock(&history).clone())
            .unwrap_or_default()
    }

    /// Version whose body is byte-identical to `body`
    pub fn find_by_body(&self, metadata_id: u64, body: &str) -> Option<u32> {
        let fingerprint = Checksum::from_text(body);
        let history = self.history(metadata_id)?;
        let versions = read_lock(&history);
        versions
            .iter()
            .find(|v| v.fingerprint == fingerprint)
            .map(|v| v.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn accept(_: &[SchemaVersion]) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_versions_start_at_one_and_are_dense() {
        let dir = tempdir().unwrap();
        let store = VersionStore::open(dir.path()).unwrap();

        assert!(store.latest(1).is_none());
        assert_eq!(store.append(1, "a", accept).unwrap().version, 1);
        assert_eq!(store.append(1, "b", accept).unwrap().version, 2);
        assert_eq!(store.append(2, "c", accept).unwrap().version, 1);

        assert_eq!(store.latest(1).unwrap().body, "b");
        assert_eq!(store.get(1, 1).unwrap().body, "a");
        assert!(store.get(1, 0).is_none());
        assert!(store.get(1, 3).is_none());
        assert_eq!(store.find_by_body(1, "b"), Some(2));
        assert_eq!(store.find_by_body(1, "c"), None);
    }

    #[test]
    fn test_rejected_append_consumes_nothing() {
        let dir = tempdir().unwrap();
        let store = VersionStore::open(dir.path()).unwrap();

        store.append(7, "a", accept).unwrap();
        let rejected = store.append(7, "bad", |_| {
            Err(RegistryError::IncompatibleSchema("no".to_string()))
        });
        assert!(matches!(rejected, Err(RegistryError::IncompatibleSchema(_))));
        assert_eq!(store.append(7, "b", accept).unwrap().version, 2);
        assert_eq!(store.list(7).len(), 2);
    }

    #[test]
    fn test_gate_sees_current_history() {
        let dir = tempdir().unwrap();
        let store = VersionStore::open(dir.path()).unwrap();
        store.append(3, "a", accept).unwrap();
        store
            .append(3, "b", |history| {
                assert_eq!(history.len(), 1);
                assert_eq!(history[0].body, "a");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_reopen_restores_history() {
        let dir = tempdir().unwrap();
        {
            let store = VersionStore::open(dir.path()).unwrap();
            store.append(5, "a", accept).unwrap();
            store.append(5, "b", accept).unwrap();
        }
        let store = VersionStore::open(dir.path()).unwrap();
        let versions: Vec<u32> = store.list(5).iter().map(|v| v.version).collect();
        assert_eq!(versions, vec![1, 2]);
        assert_eq!(store.append(5, "c", accept).unwrap().version, 3);
    }

    #[test]
    fn test_gapped_history_is_corrupt() {
        let dir = tempdir().unwrap();
        {
            let store = VersionStore::open(dir.path()).unwrap();
            for body in ["a", "b", "c"] {
                store.append(1, body, accept).unwrap();
            }
        }
        std::fs::remove_file(dir.path().join("1").join("2.json")).unwrap();

        let err = VersionStore::open(dir.path()).err().unwrap();
        assert!(matches!(err, RegistryError::Corrupt(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::StorageFailure);
    }

    #[test]
    fn test_tampered_body_is_corrupt() {
        let dir = tempdir().unwrap();
        {
            let store = VersionStore::open(dir.path()).unwrap();
            store.append(4, "original", accept).unwrap();
        }
        let path = dir.path().join("4").join("1.json");
        let mut record: SchemaVersion =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        record.body = "edited".to_string();
        std::fs::write(&path, serde_json::to_string(&record).unwrap()).unwrap();

        assert!(matches!(VersionStore::open(dir.path()), Err(RegistryError::Corrupt(_))));
    }
}
