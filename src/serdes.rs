//! Serializer/deserializer descriptors and their links to schemas

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::error::{RegistryError, Result};
use crate::ids::{IdAllocator, IdNamespace};
use crate::storage::{read_json_dir, read_lock, write_json_new, write_json_replace, write_lock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerDesKind {
    Serializer,
    Deserializer,
}

impl fmt::Display for SerDesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerDesKind::Serializer => f.write_str("serializer"),
            SerDesKind::Deserializer => f.write_str("deserializer"),
        }
    }
}

/// Request to register a SerDes artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSerDes {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: SerDesKind,
    /// Content id of the uploaded artifact
    pub file_id: String,
    /// Entry point inside the artifact, e.g. a class name
    pub implementation_ref: String,
}

/// A registered serializer or deserializer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerDesDescriptor {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: SerDesKind,
    pub file_id: Checksum,
    pub implementation_ref: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LinkRecord {
    metadata_id: u64,
    serdes_ids: Vec<u64>,
}

#[derive(Default)]
struct SerDesIndex {
    descriptors: BTreeMap<u64, SerDesDescriptor>,
    // metadata id -> serdes ids in link order
    links: HashMap<u64, Vec<u64>>,
}

pub struct SerDesRegistry {
    serdes_dir: PathBuf,
    links_dir: PathBuf,
    index: RwLock<SerDesIndex>,
}

impl SerDesRegistry {
    pub fn open(
        serdes_dir: impl AsRef<Path>,
        links_dir: impl AsRef<Path>,
        ids: &IdAllocator,
    ) -> Result<Self> {
        let serdes_dir = serdes_dir.as_ref().to_path_buf();
        let links_dir = links_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&serdes_dir)?;
        std::fs::create_dir_all(&links_dir)?;

        let mut index = SerDesIndex::default();
        for descriptor in read_json_dir::<SerDesDescriptor>(&serdes_dir)? {
            ids.observe(IdNamespace::SerDes, descriptor.id);
            index.descriptors.insert(descriptor.id, descriptor);
        }
        for link in read_json_dir::<LinkRecord>(&links_dir)? {
            index.links.insert(link.metadata_id, link.serdes_ids);
        }

        Ok(Self {
            serdes_dir,
            links_dir,
            index: RwLock::new(index),
        })
    }

    pub fn register(&self, ids: &IdAllocator, new: NewSerDes) -> Result<SerDesDescriptor> {
        if new.name.trim().is_empty() {
            return Err(RegistryError::InvalidInput("SerDes name must not be empty".to_string()));
        }
        if new.implementation_ref.trim().is_empty() {
            return Err(RegistryError::InvalidInput(
                "SerDes implementation reference must not be empty".to_string(),
            ));
        }
        let file_id = Checksum::parse(&new.file_id)?;

        let descriptor = SerDesDescriptor {
            id: ids.next_id(IdNamespace::SerDes),
            name: new.name,
            description: new.description,
            kind: new.kind,
            file_id,
            implementation_ref: new.implementation_ref,
            created_at: Utc::now(),
        };
        write_json_new(&self.serdes_dir.join(format!("{}.json", descriptor.id)), &descriptor)?;
        write_lock(&self.index)
            .descriptors
            .insert(descriptor.id, descriptor.clone());
        Ok(descriptor)
    }

    pub fn get(&self, id: u64) -> Option<SerDesDescriptor> {
        read_lock(&self.index).descriptors.get(&id).cloned()
    }

    /// Link a descriptor to a schema. Returns `false` if the link already existed.
    ///
    /// The caller is responsible for checking that `metadata_id` exists.
    pub fn link(&self, metadata_id: u64, serdes_id: u64) -> Result<bool> {
        let mut index = write_lock(&self.index);
        if !index.descriptors.contains_key(&serdes_id) {
            return Err(RegistryError::SerDesNotFound(serdes_id));
        }

        let current = index.links.get(&metadata_id).cloned().unwrap_or_default();
        if current.contains(&serdes_id) {
            return Ok(false);
        }

        let mut serdes_ids = current;
        serdes_ids.push(serdes_id);
        let record = LinkRecord { metadata_id, serdes_ids };
        write_json_replace(&self.links_dir.join(format!("{}.json", metadata_id)), &record)?;
        index.links.insert(metadata_id, record.serdes_ids);
        Ok(true)
    }

    /// Descriptors of `kind` linked to a schema, in link order
    pub fn list_for_schema(&self, metadata_id: u64, kind: SerDesKind) -> Vec<SerDesDescriptor> {
        let index = read_lock(&self.index);
        index
            .links
            .get(&metadata_id)
            .into_iter()
            .flatten()
            .filter_map(|id| index.descriptors.get(id))
            .filter(|d| d.kind == kind)
            .cloned()
            .collect()
    }
}
