//! Schema Catalog
//!
//! A schema registry core: stores schemas under a `type/group/name` identity,
//! keeps an append-only version history per schema, gates every new version
//! with a compatibility policy, and keeps serializer/deserializer artifacts in
//! a content-addressed store.
//!
//! ## Features
//!
//! - **Gap-free Versioning**: versions are numbered 1, 2, 3, ... per schema;
//!   rejected candidates never consume a number
//! - **Compatibility Policies**: `NONE`, `BACKWARD`, `FORWARD`, `FULL`,
//!   evaluated by pluggable formats (Avro, JSON Schema)
//! - **Content Addressing**: uploaded artifacts are keyed by their SHA256
//!   digest, so identical uploads are stored once
//! - **Thread Safety**: every operation takes `&self`; version assignment is
//!   serialized per schema
//!
//! ## Layout
//!
//! ```text
//! <root>/
//! ├── metadata/{id}.json
//! ├── versions/{metadata_id}/{version}.json
//! ├── serdes/{id}.json
//! ├── links/{metadata_id}.json
//! └── content/
//!     ├── staging/
//!     └── {hash[..2]}/{hash}
//! ```

pub mod checksum;
pub mod compatibility;
pub mod config;
pub mod content;
pub mod error;
pub mod format;
pub mod ids;
pub mod metadata;
pub mod registry;
pub mod schema;
pub mod serdes;
pub mod version;

mod storage;

pub use checksum::Checksum;
pub use compatibility::{
    ChangeType, CompatibilityChecker, CompatibilityResult, Direction, SchemaChange,
};
pub use config::CatalogConfig;
pub use content::{ContentRecord, ContentStream};
pub use error::{ErrorKind, RegistryError, Result};
pub use format::SchemaFormat;
pub use registry::SchemaRegistry;
pub use schema::{CompatibilityPolicy, SchemaIdentity, SchemaMetadata};
pub use serdes::{NewSerDes, SerDesDescriptor, SerDesKind};
pub use version::SchemaVersion;
