//! Schema Registry
//!
//! Facade tying the stores together. Every operation is synchronous, takes
//! `&self`, and can be called from any number of threads at once.

use std::io::Read;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::compatibility::{CompatibilityChecker, CompatibilityResult};
use crate::config::CatalogConfig;
use crate::content::{ContentRecord, ContentStore, ContentStream};
use crate::error::{RegistryError, Result};
use crate::format::SchemaFormat;
use crate::ids::IdAllocator;
use crate::metadata::MetadataStore;
use crate::schema::{CompatibilityPolicy, SchemaIdentity, SchemaMetadata};
use crate::serdes::{NewSerDes, SerDesDescriptor, SerDesKind, SerDesRegistry};
use crate::version::{SchemaVersion, VersionStore};

/// The main schema registry
pub struct SchemaRegistry {
    /// Path to the registry root
    root: PathBuf,
    ids: IdAllocator,
    metadata: MetadataStore,
    versions: VersionStore,
    serdes: SerDesRegistry,
    content: ContentStore,
    name_pattern: Regex,
    max_schema_bytes: usize,
}

impl SchemaRegistry {
    /// Open an existing registry or create a new one with default settings
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &CatalogConfig::default())
    }

    /// Open the registry at the configured path
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        Self::open_with(config.registry_path(), config)
    }

    /// Open the registry at `path` using the content and validation settings of `config`
    pub fn open_with(path: impl AsRef<Path>, config: &CatalogConfig) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        let name_pattern = Regex::new(&config.validation.name_pattern).map_err(|e| {
            RegistryError::InvalidInput(format!("invalid identity name pattern: {}", e))
        })?;

        let ids = IdAllocator::new();
        let metadata = MetadataStore::open(root.join("metadata"), &ids)?;
        let versions = VersionStore::open(root.join("versions"))?;
        let serdes = SerDesRegistry::open(root.join("serdes"), root.join("links"), &ids)?;
        let content = ContentStore::open(root.join("content"), config.content.buffer_size)?;

        tracing::info!(
            root = %root.display(),
            schemas = metadata.list_all().len(),
            "Opened schema registry"
        );

        Ok(Self {
            root,
            ids,
            metadata,
            versions,
            serdes,
            content,
            name_pattern,
            max_schema_bytes: config.validation.max_schema_bytes,
        })
    }

    /// Get the root path of the registry
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn validate_identity(&self, identity: &SchemaIdentity) -> Result<SchemaFormat> {
        for (segment, value) in [
            ("type", &identity.schema_type),
            ("group", &identity.group),
            ("name", &identity.name),
        ] {
            if !self.name_pattern.is_match(value) {
                return Err(RegistryError::InvalidInput(format!(
                    "schema {} '{}' does not match {}",
                    segment,
                    value,
                    self.name_pattern.as_str()
                )));
            }
        }
        SchemaFormat::for_type(&identity.schema_type)
    }

    // ---------------------------------------------------------------------
    // Schema metadata
    // ---------------------------------------------------------------------

    /// Create metadata for a new identity; an existing identity is a conflict
    pub fn create_metadata(
        &self,
        identity: SchemaIdentity,
        description: impl Into<String>,
        compatibility: CompatibilityPolicy,
    ) -> Result<SchemaMetadata> {
        self.validate_identity(&identity)?;
        let metadata = self
            .metadata
            .create(&self.ids, identity, description.into(), compatibility)?;
        tracing::info!(
            metadata_id = metadata.id,
            identity = %metadata.identity,
            compatibility = %metadata.compatibility,
            "Schema metadata created"
        );
        Ok(metadata)
    }

    pub fn get_metadata(&self, identity: &SchemaIdentity) -> Result<SchemaMetadata> {
        self.metadata
            .get_by_identity(identity)
            .ok_or_else(|| RegistryError::MetadataNotFound(identity.to_string()))
    }

    pub fn get_metadata_by_id(&self, metadata_id: u64) -> Result<SchemaMetadata> {
        self.metadata
            .get_by_id(metadata_id)
            .ok_or_else(|| RegistryError::MetadataNotFound(format!("id {}", metadata_id)))
    }

    /// All metadata records ordered by id
    pub fn list_metadata(&self) -> Vec<SchemaMetadata> {
        self.metadata.list_all()
    }

    // ---------------------------------------------------------------------
    // Versions
    // ---------------------------------------------------------------------

    fn checker_for(&self, metadata: &SchemaMetadata) -> Result<CompatibilityChecker> {
        SchemaFormat::for_type(&metadata.identity.schema_type).map(CompatibilityChecker::new)
    }

    /// Add a new version after checking it against the metadata's policy.
    ///
    /// Returns the assigned version number. A rejected candidate is not
    /// recorded and does not consume a number.
    pub fn add_version(&self, metadata_id: u64, body: &str) -> Result<u32> {
        let metadata = self.get_metadata_by_id(metadata_id)?;
        let checker = self.checker_for(&metadata)?;

        if body.len() > self.max_schema_bytes {
            return Err(RegistryError::InvalidSchema(format!(
                "schema body of {} bytes exceeds the {} byte limit",
                body.len(),
                self.max_schema_bytes
            )));
        }
        checker.format().parse(body)?;

        let committed = self.versions.append(metadata_id, body, |history| {
            let result = checker.evaluate(body, metadata.compatibility, history);
            if result.is_compatible {
                Ok(())
            } else {
                tracing::warn!(
                    metadata_id,
                    against = ?result.checked_against,
                    policy = %metadata.compatibility,
                    reason = %result.summary,
                    "Rejected incompatible schema"
                );
                Err(RegistryError::IncompatibleSchema(result.summary))
            }
        })?;

        tracing::info!(
            metadata_id,
            version = committed.version,
            fingerprint = %committed.fingerprint,
            "Schema version added"
        );
        Ok(committed.version)
    }

    /// Create the metadata if needed and add `body` as its next version.
    ///
    /// When the identity already exists its stored description and policy are
    /// kept; the arguments only apply to a newly created record.
    pub fn register_schema(
        &self,
        identity: SchemaIdentity,
        description: impl Into<String>,
        compatibility: CompatibilityPolicy,
        body: &str,
    ) -> Result<u32> {
        let metadata = match self.metadata.get_by_identity(&identity) {
            Some(existing) => existing,
            None => match self.create_metadata(identity.clone(), description, compatibility) {
                Ok(created) => created,
                // lost a concurrent create of the same identity
                Err(RegistryError::AlreadyExists(_)) => self.get_metadata(&identity)?,
                Err(e) => return Err(e),
            },
        };
        self.add_version(metadata.id, body)
    }

    /// Fetch one version; distinguishes missing metadata from a missing version
    pub fn get_version(&self, metadata_id: u64, version: u32) -> Result<SchemaVersion> {
        self.get_metadata_by_id(metadata_id)?;
        self.versions
            .get(metadata_id, version)
            .ok_or(RegistryError::VersionNotFound { metadata_id, version })
    }

    /// Latest version, or `None` while the schema has no versions yet
    pub fn get_latest_version(&self, metadata_id: u64) -> Result<Option<SchemaVersion>> {
        self.get_metadata_by_id(metadata_id)?;
        Ok(self.versions.latest(metadata_id))
    }

    /// All versions in ascending order
    pub fn list_versions(&self, metadata_id: u64) -> Result<Vec<SchemaVersion>> {
        self.get_metadata_by_id(metadata_id)?;
        Ok(self.versions.list(metadata_id))
    }

    /// Version number of a previously registered, byte-identical body
    pub fn find_version_by_body(&self, metadata_id: u64, body: &str) -> Result<Option<u32>> {
        self.get_metadata_by_id(metadata_id)?;
        Ok(self.versions.find_by_body(metadata_id, body))
    }

    /// Pre-flight check of `body` against the latest or a named version
    pub fn check_compatible(
        &self,
        metadata_id: u64,
        body: &str,
        version: Option<u32>,
    ) -> Result<bool> {
        Ok(self
            .check_compatibility_report(metadata_id, body, version)?
            .is_compatible)
    }

    /// Like [`check_compatible`](Self::check_compatible), with the detected problems
    pub fn check_compatibility_report(
        &self,
        metadata_id: u64,
        body: &str,
        version: Option<u32>,
    ) -> Result<CompatibilityResult> {
        let metadata = self.get_metadata_by_id(metadata_id)?;
        let checker = self.checker_for(&metadata)?;
        let reference = match version {
            Some(v) => Some(self.get_version(metadata_id, v)?),
            None => self.versions.latest(metadata_id),
        };
        let result = checker.evaluate_against(body, metadata.compatibility, reference.as_ref());
        tracing::debug!(
            metadata_id,
            against = ?result.checked_against,
            compatible = result.is_compatible,
            "Compatibility checked"
        );
        Ok(result)
    }

    // ---------------------------------------------------------------------
    // SerDes
    // ---------------------------------------------------------------------

    pub fn register_serdes(&self, new: NewSerDes) -> Result<u64> {
        let descriptor = self.serdes.register(&self.ids, new)?;
        tracing::info!(
            serdes_id = descriptor.id,
            kind = %descriptor.kind,
            file_id = %descriptor.file_id,
            "SerDes registered"
        );
        Ok(descriptor.id)
    }

    pub fn get_serdes(&self, serdes_id: u64) -> Result<SerDesDescriptor> {
        self.serdes
            .get(serdes_id)
            .ok_or(RegistryError::SerDesNotFound(serdes_id))
    }

    /// Associate a SerDes with a schema; linking twice is a no-op
    pub fn link_serdes(&self, metadata_id: u64, serdes_id: u64) -> Result<()> {
        if !self.metadata.contains(metadata_id) {
            return Err(RegistryError::MetadataNotFound(format!("id {}", metadata_id)));
        }
        if self.serdes.link(metadata_id, serdes_id)? {
            tracing::info!(metadata_id, serdes_id, "SerDes linked");
        } else {
            tracing::debug!(metadata_id, serdes_id, "SerDes already linked");
        }
        Ok(())
    }

    pub fn link_serdes_by_identity(&self, identity: &SchemaIdentity, serdes_id: u64) -> Result<()> {
        let metadata = self.get_metadata(identity)?;
        self.link_serdes(metadata.id, serdes_id)
    }

    /// SerDes of `kind` linked to a schema; empty when none are linked
    pub fn list_serdes(&self, metadata_id: u64, kind: SerDesKind) -> Vec<SerDesDescriptor> {
        self.serdes.list_for_schema(metadata_id, kind)
    }

    pub fn list_serdes_for_identity(
        &self,
        identity: &SchemaIdentity,
        kind: SerDesKind,
    ) -> Result<Vec<SerDesDescriptor>> {
        let metadata = self.get_metadata(identity)?;
        Ok(self.list_serdes(metadata.id, kind))
    }

    /// Stream the artifact a SerDes descriptor points at
    pub fn download_serdes(&self, serdes_id: u64) -> Result<ContentStream> {
        let descriptor = self.get_serdes(serdes_id)?;
        self.content.get(descriptor.file_id.as_str())
    }

    // ---------------------------------------------------------------------
    // Content
    // ---------------------------------------------------------------------

    /// Store an artifact and return its content id
    pub fn upload_content(&self, reader: impl Read) -> Result<String> {
        Ok(self.content.put(reader)?.id.to_string())
    }

    pub fn download_content(&self, id: &str) -> Result<ContentStream> {
        self.content.get(id)
    }

    pub fn content_info(&self, id: &str) -> Result<ContentRecord> {
        self.content.info(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const USER_V1: &str = r#"{"type": "record", "name": "User", "fields": [{"name": "a", "type": "int"}]}"#;

    fn user() -> SchemaIdentity {
        SchemaIdentity::new("avro", "kafka", "User")
    }

    #[test]
    fn test_create_registry() {
        let dir = tempdir().unwrap();
        let registry = SchemaRegistry::open(dir.path()).unwrap();
        assert!(registry.list_metadata().is_empty());
        assert_eq!(registry.root(), dir.path());
    }

    #[test]
    fn test_identity_validation() {
        let dir = tempdir().unwrap();
        let registry = SchemaRegistry::open(dir.path()).unwrap();

        let unknown_type = SchemaIdentity::new("protobuf", "g", "n");
        let bad_name = SchemaIdentity::new("avro", "g", "has space");
        let empty_group = SchemaIdentity::new("avro", "", "n");
        for identity in [unknown_type, bad_name, empty_group] {
            let err = registry
                .create_metadata(identity, "", CompatibilityPolicy::None)
                .unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::MalformedInput);
        }
        assert!(registry.list_metadata().is_empty());
    }

    #[test]
    fn test_malformed_body_is_rejected_before_versioning() {
        let dir = tempdir().unwrap();
        let registry = SchemaRegistry::open(dir.path()).unwrap();
        let metadata = registry
            .create_metadata(user(), "", CompatibilityPolicy::None)
            .unwrap();

        let err = registry.add_version(metadata.id, "{a:int}").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSchema(_)));
        assert!(!registry.check_compatible(metadata.id, "{a:int}", None).unwrap());
        assert_eq!(registry.add_version(metadata.id, USER_V1).unwrap(), 1);
    }

    #[test]
    fn test_register_schema_reuses_metadata() {
        let dir = tempdir().unwrap();
        let registry = SchemaRegistry::open(dir.path()).unwrap();

        let v1 = registry
            .register_schema(user(), "users", CompatibilityPolicy::Backward, USER_V1)
            .unwrap();
        let v2 = registry
            .register_schema(user(), "ignored", CompatibilityPolicy::None, USER_V1)
            .unwrap();
        assert_eq!((v1, v2), (1, 2));

        let metadata = registry.get_metadata(&user()).unwrap();
        assert_eq!(metadata.description, "users");
        assert_eq!(metadata.compatibility, CompatibilityPolicy::Backward);
        assert_eq!(registry.find_version_by_body(metadata.id, USER_V1).unwrap(), Some(1));
    }

    #[test]
    fn test_oversized_body() {
        let dir = tempdir().unwrap();
        let mut config = CatalogConfig::default();
        config.validation.max_schema_bytes = 16;
        let registry = SchemaRegistry::open_with(dir.path(), &config).unwrap();
        let metadata = registry
            .create_metadata(user(), "", CompatibilityPolicy::None)
            .unwrap();
        assert!(matches!(
            registry.add_version(metadata.id, USER_V1),
            Err(RegistryError::InvalidSchema(_))
        ));
    }
}
