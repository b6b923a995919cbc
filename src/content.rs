//! Content-addressed artifact storage
//!
//! Uploads are streamed into a staging file while being hashed, then published
//! under their SHA256 digest with a no-clobber rename. Identical uploads end up
//! as one file; concurrent duplicates race on the publish and the loser simply
//! discards its staging copy.
//!
//! Several processes may open the same root. Opening only sweeps staging files
//! older than [`STALE_STAGING_AGE`], so uploads in flight elsewhere survive.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::checksum::{Checksum, ChecksumWriter};
use crate::error::{RegistryError, Result};

/// Id and size of a stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: Checksum,
    pub size: u64,
}

/// Single-pass reader over a stored artifact
#[derive(Debug)]
pub struct ContentStream {
    record: ContentRecord,
    reader: BufReader<File>,
}

impl ContentStream {
    pub fn id(&self) -> &Checksum {
        &self.record.id
    }

    pub fn size(&self) -> u64 {
        self.record.size
    }
}

impl Read for ContentStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Staging files untouched for this long belong to uploads that never published
pub const STALE_STAGING_AGE: Duration = Duration::from_secs(60 * 60);

fn sweep_stale(staging: &Path, max_age: Duration) -> io::Result<()> {
    let now = SystemTime::now();
    for entry in fs::read_dir(staging)? {
        let entry = entry?;
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            // already published or removed by its owner
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        let age = now.duration_since(modified).unwrap_or_default();
        if age < max_age {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                tracing::debug!(path = %entry.path().display(), "Removed stale staging file");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

pub struct ContentStore {
    dir: PathBuf,
    staging: PathBuf,
    buffer_size: usize,
}

impl ContentStore {
    pub fn open(dir: impl AsRef<Path>, buffer_size: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let staging = dir.join("staging");
        fs::create_dir_all(&staging)?;
        sweep_stale(&staging, STALE_STAGING_AGE)?;

        Ok(Self {
            dir,
            staging,
            buffer_size: buffer_size.max(1),
        })
    }

    fn path_for(&self, id: &Checksum) -> PathBuf {
        self.dir.join(&id.as_str()[..2]).join(id.as_str())
    }

    /// Store everything `reader` yields and return its content id
    pub fn put(&self, reader: impl Read) -> Result<ContentRecord> {
        let mut staged = NamedTempFile::new_in(&self.staging)?;
        let (id, size) = {
            let mut source = BufReader::with_capacity(self.buffer_size, reader);
            let sink = BufWriter::with_capacity(self.buffer_size, staged.as_file_mut());
            let mut writer = ChecksumWriter::new(sink);
            io::copy(&mut source, &mut writer)?;
            let (_, id, size) = writer.finish()?;
            (id, size)
        };
        staged.as_file().sync_all()?;

        let target = self.path_for(&id);
        let record = ContentRecord { id, size };
        if self.contains(&record.id) {
            tracing::debug!(content_id = %record.id, size, "Content already stored");
            return Ok(record);
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        match staged.persist_noclobber(&target) {
            Ok(_) => {
                tracing::info!(content_id = %record.id, size, "Content stored");
                Ok(record)
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!(content_id = %record.id, "Concurrent upload published first");
                Ok(record)
            }
            Err(e) => Err(e.error.into()),
        }
    }

    fn open_file(&self, id: &str) -> Result<(Checksum, File)> {
        let checksum = Checksum::parse(id)?;
        match File::open(self.path_for(&checksum)) {
            Ok(file) => Ok((checksum, file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(RegistryError::ContentNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Open a stored artifact for streaming
    pub fn get(&self, id: &str) -> Result<ContentStream> {
        let (checksum, file) = self.open_file(id)?;
        let size = file.metadata()?.len();
        Ok(ContentStream {
            record: ContentRecord { id: checksum, size },
            reader: BufReader::with_capacity(self.buffer_size, file),
        })
    }

    pub fn info(&self, id: &str) -> Result<ContentRecord> {
        let (checksum, file) = self.open_file(id)?;
        Ok(ContentRecord {
            id: checksum,
            size: file.metadata()?.len(),
        })
    }

    pub fn contains(&self, id: &Checksum) -> bool {
        self.path_for(id).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn read_all(mut stream: ContentStream) -> Vec<u8> {
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let store = ContentStore::open(dir.path(), 16).unwrap();

        for data in [Vec::new(), b"jar".to_vec(), vec![7u8; 10_000]] {
            let record = store.put(Cursor::new(data.clone())).unwrap();
            assert_eq!(record.size, data.len() as u64);
            assert_eq!(record.id, Checksum::from_bytes(&data));
            let stream = store.get(record.id.as_str()).unwrap();
            assert_eq!(stream.size(), data.len() as u64);
            assert_eq!(read_all(stream), data);
        }
    }

    #[test]
    fn test_duplicate_upload_is_deduplicated() {
        let dir = tempdir().unwrap();
        let store = ContentStore::open(dir.path(), 1024).unwrap();

        let first = store.put(Cursor::new(b"same bytes".to_vec())).unwrap();
        let second = store.put(Cursor::new(b"same bytes".to_vec())).unwrap();
        assert_eq!(first, second);

        let shard = dir.path().join(&first.id.as_str()[..2]);
        assert_eq!(fs::read_dir(shard).unwrap().count(), 1);
        assert_eq!(fs::read_dir(dir.path().join("staging")).unwrap().count(), 0);
    }

    #[test]
    fn test_open_keeps_fresh_staging_files() {
        let dir = tempdir().unwrap();
        let staging = dir.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        let in_flight = staging.join("upload-in-progress");
        fs::write(&in_flight, b"partial").unwrap();

        let abandoned = staging.join("abandoned");
        fs::write(&abandoned, b"old").unwrap();
        File::options()
            .write(true)
            .open(&abandoned)
            .unwrap()
            .set_modified(SystemTime::now() - 2 * STALE_STAGING_AGE)
            .unwrap();

        ContentStore::open(dir.path(), 1024).unwrap();
        assert!(in_flight.exists());
        assert!(!abandoned.exists());
    }

    #[test]
    fn test_missing_and_invalid_ids() {
        let dir = tempdir().unwrap();
        let store = ContentStore::open(dir.path(), 1024).unwrap();

        let absent = Checksum::from_bytes(b"never uploaded");
        assert!(matches!(store.get(absent.as_str()), Err(RegistryError::ContentNotFound(_))));
        assert!(!store.contains(&absent));
        assert!(matches!(store.get("../secrets"), Err(RegistryError::InvalidInput(_))));
    }
}
