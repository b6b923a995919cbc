//! Schema metadata store
//!
//! Owns the identity → id bijection. Creation runs entirely under the index
//! write lock, so two creates of one identity cannot both succeed.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;

use crate::error::{RegistryError, Result};
use crate::ids::{IdAllocator, IdNamespace};
use crate::schema::{CompatibilityPolicy, SchemaIdentity, SchemaMetadata};
use crate::storage::{read_json_dir, read_lock, write_json_new, write_lock};

#[derive(Default)]
struct MetadataIndex {
    by_id: BTreeMap<u64, SchemaMetadata>,
    by_identity: HashMap<SchemaIdentity, u64>,
}

pub struct MetadataStore {
    dir: PathBuf,
    index: RwLock<MetadataIndex>,
}

impl MetadataStore {
    /// Open the store rooted at `dir` and seed `ids` past every loaded record
    pub fn open(dir: impl AsRef<Path>, ids: &IdAllocator) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let mut index = MetadataIndex::default();
        for record in read_json_dir::<SchemaMetadata>(&dir)? {
            ids.observe(IdNamespace::SchemaMetadata, record.id);
            if let Some(other) = index.by_identity.insert(record.identity.clone(), record.id) {
                return Err(RegistryError::Corrupt(format!(
                    "identity {} is stored twice (ids {} and {})",
                    record.identity, other, record.id
                )));
            }
            index.by_id.insert(record.id, record);
        }
        tracing::debug!(count = index.by_id.len(), "Loaded schema metadata");

        Ok(Self {
            dir,
            index: RwLock::new(index),
        })
    }

    /// Create the metadata record for a new identity.
    ///
    /// Fails with [`RegistryError::AlreadyExists`] if the identity is taken.
    pub fn create(
        &self,
        ids: &IdAllocator,
        identity: SchemaIdentity,
        description: String,
        compatibility: CompatibilityPolicy,
    ) -> Result<SchemaMetadata> {
        let mut index = write_lock(&self.index);
        if index.by_identity.contains_key(&identity) {
            return Err(RegistryError::AlreadyExists(identity.to_string()));
        }

        let record = SchemaMetadata {
            id: ids.next_id(IdNamespace::SchemaMetadata),
            identity,
            description,
            compatibility,
            created_at: Utc::now(),
        };
        write_json_new(&self.dir.join(format!("{}.json", record.id)), &record)?;

        index.by_identity.insert(record.identity.clone(), record.id);
        index.by_id.insert(record.id, record.clone());
        Ok(record)
    }

    pub fn get_by_identity(&self, identity: &SchemaIdentity) -> Option<SchemaMetadata> {
        let index = read_lock(&self.index);
        index
            .by_identity
            .get(identity)
            .and_then(|id| index.by_id.get(id))
            .cloned()
    }

    pub fn get_by_id(&self, id: u64) -> Option<SchemaMetadata> {
        read_lock(&self.index).by_id.get(&id).cloned()
    }

    pub fn contains(&self, id: u64) -> bool {
        read_lock(&self.index).by_id.contains_key(&id)
    }

    /// Snapshot of all records ordered by id
    pub fn list_all(&self) -> Vec<SchemaMetadata> {
        read_lock(&self.index).by_id.values().cloned().collect()
    }
}
