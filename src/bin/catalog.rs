//! Schema Catalog CLI
//!
//! Commands for managing a local schema catalog.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use schema_catalog::{
    CatalogConfig, CompatibilityPolicy, NewSerDes, SchemaIdentity, SchemaRegistry, SerDesKind,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-catalog")]
#[command(about = "Versioned schema catalog with compatibility checks")]
struct Cli {
    /// Path to the catalog root (overrides the configured path)
    #[arg(short, long)]
    registry: Option<PathBuf>,

    /// Config file to load
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct IdentityArgs {
    /// Schema type (avro, json)
    #[arg(long = "type")]
    schema_type: String,
    /// Schema group
    #[arg(long)]
    group: String,
    /// Schema name
    #[arg(long)]
    name: String,
}

impl IdentityArgs {
    fn identity(&self) -> SchemaIdentity {
        SchemaIdentity::new(&self.schema_type, &self.group, &self.name)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new catalog
    Init,

    /// Create schema metadata
    Create {
        #[command(flatten)]
        identity: IdentityArgs,
        /// Description
        #[arg(short, long, default_value = "")]
        description: String,
        /// Compatibility policy (NONE, BACKWARD, FORWARD, FULL)
        #[arg(short, long)]
        policy: Option<CompatibilityPolicy>,
    },

    /// List all schema metadata
    List,

    /// Add a version from a schema file
    Add {
        /// Metadata id
        id: u64,
        /// Schema file
        file: PathBuf,
    },

    /// Print one version
    Get {
        /// Metadata id
        id: u64,
        /// Version number
        version: u32,
    },

    /// Print the latest version
    Latest {
        /// Metadata id
        id: u64,
    },

    /// List the versions of a schema
    Versions {
        /// Metadata id
        id: u64,
    },

    /// Check a schema file without registering it
    Check {
        /// Metadata id
        id: u64,
        /// Schema file
        file: PathBuf,
        /// Compare with this version instead of the latest
        #[arg(short, long)]
        version: Option<u32>,
    },

    /// Upload an artifact
    Upload {
        /// File to upload
        file: PathBuf,
    },

    /// Download an artifact
    Download {
        /// Content id
        id: String,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage serializers and deserializers
    Serdes {
        #[command(subcommand)]
        command: SerdesCommands,
    },

    /// Show or write configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum SerdesCommands {
    /// Register a serializer or deserializer
    Register {
        /// Name
        name: String,
        /// serializer or deserializer
        #[arg(short, long)]
        kind: String,
        /// Content id of the uploaded artifact
        #[arg(short, long)]
        file_id: String,
        /// Implementation reference (e.g. class name)
        #[arg(short, long)]
        implementation: String,
        /// Description
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Show a descriptor
    Get {
        id: u64,
    },
    /// Link a descriptor to a schema
    Link {
        /// Metadata id
        metadata_id: u64,
        /// SerDes id
        serdes_id: u64,
    },
    /// List descriptors linked to a schema
    List {
        /// Metadata id
        metadata_id: u64,
        /// serializer or deserializer
        #[arg(short, long, default_value = "serializer")]
        kind: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Write the default configuration
    Init {
        #[arg(short, long, default_value = "catalog.toml")]
        output: String,
    },
}

fn parse_kind(kind: &str) -> anyhow::Result<SerDesKind> {
    match kind.to_ascii_lowercase().as_str() {
        "serializer" | "ser" => Ok(SerDesKind::Serializer),
        "deserializer" | "de" => Ok(SerDesKind::Deserializer),
        other => bail!("unknown SerDes kind '{}'", other),
    }
}

fn read_schema(path: &PathBuf) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = CatalogConfig::load_from(cli.config.as_deref())?;
    if let Some(path) = cli.registry {
        config.registry.path = path;
    }

    if let Commands::Config { command } = &cli.command {
        match command {
            ConfigCommands::Show => print!("{}", toml::to_string_pretty(&config)?),
            ConfigCommands::Init { output } => {
                CatalogConfig::default().save(output)?;
                println!("✅ Wrote default configuration to {}", output);
            }
        }
        return Ok(());
    }

    let registry = SchemaRegistry::from_config(&config)?;

    match cli.command {
        Commands::Init => {
            println!("✅ Catalog initialized at {:?}", registry.root());
        }

        Commands::Create { identity, description, policy } => {
            let policy = policy.unwrap_or(config.registry.default_compatibility);
            let metadata = registry.create_metadata(identity.identity(), description, policy)?;
            println!(
                "✅ Created {} with id {} ({})",
                metadata.identity, metadata.id, metadata.compatibility
            );
        }

        Commands::List => {
            let all = registry.list_metadata();
            if all.is_empty() {
                println!("No schemas registered yet.");
            } else {
                println!("📚 Registered schemas:");
                for metadata in all {
                    let latest = registry
                        .get_latest_version(metadata.id)?
                        .map(|v| format!("v{}", v.version))
                        .unwrap_or_else(|| "no versions".to_string());
                    println!(
                        "  [{}] {} {} - {}",
                        metadata.id, metadata.identity, metadata.compatibility, latest
                    );
                }
            }
        }

        Commands::Add { id, file } => {
            let body = read_schema(&file)?;
            let version = registry.add_version(id, &body)?;
            println!("✅ Registered version {} for schema {}", version, id);
        }

        Commands::Get { id, version } => {
            let v = registry.get_version(id, version)?;
            println!("{}", v.body);
        }

        Commands::Latest { id } => match registry.get_latest_version(id)? {
            Some(v) => println!("{}", v.body),
            None => println!("Schema {} has no versions yet.", id),
        },

        Commands::Versions { id } => {
            for v in registry.list_versions(id)? {
                let created = v.created_at.format("%Y-%m-%d %H:%M:%S");
                println!("  v{} {} {}", v.version, created, v.fingerprint);
            }
        }

        Commands::Check { id, file, version } => {
            let body = read_schema(&file)?;
            let result = registry.check_compatibility_report(id, &body, version)?;
            if result.is_compatible {
                println!("✅ Compatible: {}", result.summary);
            } else {
                println!("❌ Incompatible: {}", result.summary);
                for change in &result.changes {
                    println!(
                        "   └─ {:?} {}: {}",
                        change.change_type, change.path, change.description
                    );
                }
                std::process::exit(1);
            }
        }

        Commands::Upload { file } => {
            let input = File::open(&file).with_context(|| format!("opening {}", file.display()))?;
            let id = registry.upload_content(input)?;
            println!("{}", id);
        }

        Commands::Download { id, output } => {
            let mut stream = registry.download_content(&id)?;
            let copied = match output {
                Some(path) => io::copy(&mut stream, &mut File::create(&path)?)?,
                None => {
                    let stdout = io::stdout();
                    let mut lock = stdout.lock();
                    let n = io::copy(&mut stream, &mut lock)?;
                    lock.flush()?;
                    n
                }
            };
            tracing::debug!(content_id = %id, bytes = copied, "Downloaded content");
        }

        Commands::Serdes { command } => match command {
            SerdesCommands::Register { name, kind, file_id, implementation, description } => {
                let id = registry.register_serdes(NewSerDes {
                    name,
                    description,
                    kind: parse_kind(&kind)?,
                    file_id,
                    implementation_ref: implementation,
                })?;
                println!("✅ Registered SerDes {}", id);
            }
            SerdesCommands::Get { id } => {
                let descriptor = registry.get_serdes(id)?;
                println!("{}", serde_json::to_string_pretty(&descriptor)?);
            }
            SerdesCommands::Link { metadata_id, serdes_id } => {
                registry.link_serdes(metadata_id, serdes_id)?;
                println!("✅ Linked SerDes {} to schema {}", serdes_id, metadata_id);
            }
            SerdesCommands::List { metadata_id, kind } => {
                for d in registry.list_serdes(metadata_id, parse_kind(&kind)?) {
                    println!("  [{}] {} {} ({})", d.id, d.name, d.implementation_ref, d.file_id);
                }
            }
        },

        Commands::Config { .. } => unreachable!("handled above"),
    }

    Ok(())
}

