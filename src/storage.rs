//! Filesystem persistence helpers shared by the stores
//!
//! Every record is a pretty-printed JSON file. Writes go to a temporary file in
//! the target directory and are then published in one step, so a reader never
//! sees a half-written record.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::Result;

fn stage_json<T: Serialize>(path: &Path, value: &T) -> Result<NamedTempFile> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut staged = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut staged, value)?;
    staged.write_all(b"\n")?;
    staged.as_file().sync_all()?;
    Ok(staged)
}

/// Write a record that must not exist yet
pub(crate) fn write_json_new<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let staged = stage_json(path, value)?;
    staged.persist_noclobber(path).map_err(|e| e.error)?;
    Ok(())
}

/// Write a record, replacing any previous content
pub(crate) fn write_json_replace<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let staged = stage_json(path, value)?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Load every `*.json` record in `dir`. A missing directory is empty.
pub(crate) fn read_json_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let content = fs::read_to_string(&path)?;
        records.push(serde_json::from_str(&content)?);
    }
    Ok(records)
}

// Index state is only mutated after the backing file has been written, so the
// data behind a poisoned lock is still consistent.
pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Record {
        id: u64,
        name: String,
    }

    #[test]
    fn test_write_new_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/1.json");
        let first = Record { id: 1, name: "first".to_string() };
        write_json_new(&path, &first).unwrap();

        let second = Record { id: 1, name: "second".to_string() };
        assert!(write_json_new(&path, &second).is_err());

        let loaded: Vec<Record> = read_json_dir(&dir.path().join("nested")).unwrap();
        assert_eq!(loaded, vec![first]);
    }

    #[test]
    fn test_replace_and_missing_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("links.json");
        write_json_replace(&path, &vec![1u64]).unwrap();
        write_json_replace(&path, &vec![1u64, 2]).unwrap();
        let content: Vec<u64> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(content, vec![1, 2]);

        let none: Vec<Record> = read_json_dir(&dir.path().join("absent")).unwrap();
        assert!(none.is_empty());
    }
}
