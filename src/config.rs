//! Configuration management for the schema catalog
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (catalog.toml)
//! - Environment variables (CATALOG__*)
//!
//! ## Example config file (catalog.toml):
//! ```toml
//! [registry]
//! path = "./catalog"
//! default_compatibility = "BACKWARD"
//!
//! [content]
//! buffer_size = 65536
//!
//! [validation]
//! name_pattern = "^[A-Za-z0-9][A-Za-z0-9._-]*$"
//! max_schema_bytes = 1048576
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::schema::CompatibilityPolicy;

/// Main configuration for the schema catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Artifact storage settings
    #[serde(default)]
    pub content: ContentConfig,

    /// Input validation settings
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Root directory of the catalog
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,

    /// Policy used when a caller does not name one
    #[serde(default)]
    pub default_compatibility: CompatibilityPolicy,
}

/// Content store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Buffer size used when streaming artifacts in and out
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Pattern every identity segment (type, group, name) must match
    #[serde(default = "default_name_pattern")]
    pub name_pattern: String,

    /// Largest accepted schema body
    #[serde(default = "default_max_schema_bytes")]
    pub max_schema_bytes: usize,
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("./catalog")
}

fn default_buffer_size() -> usize {
    64 * 1024
}

fn default_name_pattern() -> String {
    r"^[A-Za-z0-9][A-Za-z0-9._\-]*$".to_string()
}

fn default_max_schema_bytes() -> usize {
    1024 * 1024
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
            default_compatibility: CompatibilityPolicy::default(),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            name_pattern: default_name_pattern(),
            max_schema_bytes: default_max_schema_bytes(),
        }
    }
}

impl CatalogConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["catalog.toml", ".catalog.toml", "config/catalog.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("dev", "schema-catalog", "catalog") {
            let xdg_config = dirs.config_dir().join("catalog.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // CATALOG__REGISTRY__PATH=/srv/catalog
        builder = builder.add_source(
            Environment::with_prefix("CATALOG")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get the registry path (resolves relative paths)
    pub fn registry_path(&self) -> PathBuf {
        if self.registry.path.is_absolute() {
            self.registry.path.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.registry.path)
        }
    }
}
