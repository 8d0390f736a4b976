//! cloudmount CLI
//!
//! Thin wrapper around cloudmount-core for operators.
//!
//! ## Usage
//!
//! ```bash
//! # Create a config with a fresh master key
//! cloudmount init --name "Desk"
//!
//! # Print a new master key
//! cloudmount keygen
//!
//! # Encode / decode a display name for discovery payloads
//! cloudmount encode-name "Living Room"
//! cloudmount decode-name <hex>
//!
//! # Manage storage providers
//! cloudmount provider add Scratch --kind memory
//! cloudmount provider list
//! cloudmount provider remove Scratch
//!
//! # Inspect the root filesystem
//! cloudmount mounts
//! cloudmount ls /Scratch
//! cloudmount cat /Scratch/readme.md
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cloudmount_core::crypto::KEY_SIZE;
use cloudmount_core::{
    CloudConfig, FileType, LocalEndpointFactory, NameCipher, PersonalCloud, ProviderKind,
    ProviderRecord,
};
use tracing::info;

/// cloudmount - one root filesystem over LAN peers and storage providers
#[derive(Parser)]
#[command(name = "cloudmount")]
#[command(version = "0.1.0")]
#[command(about = "cloudmount - personal cloud root filesystem")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (default: ~/.cloudmount/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a new config file with a fresh master key
    Init {
        /// This node's display name
        #[arg(short, long)]
        name: String,
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Print a fresh master key (hex)
    Keygen,

    /// Encode a display name into a hex blob
    EncodeName {
        /// Name to encode (default: this node's name)
        name: Option<String>,
        /// Master key in hex (default: from config)
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Decode a hex blob back into a display name
    DecodeName {
        /// Blob in hex
        blob: String,
        /// Master key in hex (default: from config)
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Storage provider management
    Provider {
        #[command(subcommand)]
        action: ProviderAction,
    },

    /// Show the mount table
    Mounts,

    /// List a directory of the root filesystem
    Ls {
        /// Path, e.g. /Scratch/docs
        #[arg(default_value = "/")]
        path: String,
    },

    /// Print a file of the root filesystem
    Cat {
        /// Path, e.g. /Scratch/readme.md
        path: String,
    },
}

#[derive(Subcommand)]
enum ProviderAction {
    /// Attach a provider
    Add {
        /// Mount name
        name: String,
        /// Provider kind: memory or azureblob
        #[arg(short, long, default_value = "memory")]
        kind: String,
        /// Provider settings as JSON
        #[arg(short, long)]
        settings: Option<String>,
        /// Visibility tag
        #[arg(long, default_value = "private")]
        visibility: String,
    },
    /// Detach a provider
    Remove {
        /// Mount name (case-insensitive)
        name: String,
    },
    /// List configured providers
    List,
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default config path (~/.cloudmount/config.json)
fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cloudmount")
        .join("config.json")
}

fn load_config(path: &Path) -> Result<CloudConfig> {
    CloudConfig::load(path).with_context(|| {
        format!(
            "No usable config at {} (run `cloudmount init --name <name>` first)",
            path.display()
        )
    })
}

/// Parse a hex master key
fn parse_key(s: &str) -> Result<[u8; KEY_SIZE]> {
    let bytes = hex::decode(s.trim()).map_err(|e| anyhow::anyhow!("Invalid hex format: {}", e))?;
    if bytes.len() != KEY_SIZE {
        anyhow::bail!("Master key must be {} bytes (got {})", KEY_SIZE, bytes.len());
    }
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Key from the flag, falling back to the config file
fn resolve_key(flag: Option<&str>, config_path: &Path) -> Result<[u8; KEY_SIZE]> {
    match flag {
        Some(hex_key) => parse_key(hex_key),
        None => Ok(load_config(config_path)?.master_key()?),
    }
}

fn build_cloud(config_path: &Path) -> Result<PersonalCloud> {
    let config = load_config(config_path)?;
    Ok(PersonalCloud::from_config(
        &config,
        Arc::new(LocalEndpointFactory),
    )?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config_path = cli.config.unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Init { name, force } => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "Config already exists at {} (use --force to overwrite)",
                    config_path.display()
                );
            }
            if name.trim().is_empty() {
                anyhow::bail!("Node name must not be empty");
            }
            let config = CloudConfig::generate(name);
            config.save(&config_path)?;
            info!(path = %config_path.display(), "Wrote config");

            println!("Initialized cloud for node '{}'", config.node_name);
            println!("  Config: {}", config_path.display());
            println!("  Master key: {}", config.master_key);
        }

        Commands::Keygen => {
            println!("{}", hex::encode(NameCipher::generate_key()));
        }

        Commands::EncodeName { name, key } => {
            let blob = match name {
                Some(name) => {
                    let key = resolve_key(key.as_deref(), &config_path)?;
                    NameCipher::new(&key).encode(&name)
                }
                None => {
                    let mut config = load_config(&config_path)?;
                    if let Some(hex_key) = key {
                        config.master_key = hex_key;
                    }
                    config.providers.clear();
                    let cloud = PersonalCloud::from_config(&config, Arc::new(LocalEndpointFactory))?;
                    cloud.encoded_name()
                }
            };
            println!("{}", hex::encode(blob));
        }

        Commands::DecodeName { blob, key } => {
            let key = resolve_key(key.as_deref(), &config_path)?;
            let bytes =
                hex::decode(blob.trim()).map_err(|e| anyhow::anyhow!("Invalid hex format: {}", e))?;
            let name = NameCipher::new(&key)
                .decode(&bytes)
                .context("Blob is not a name for this cloud")?;
            println!("{}", name);
        }

        Commands::Provider { action } => match action {
            ProviderAction::Add {
                name,
                kind,
                settings,
                visibility,
            } => {
                let kind: ProviderKind = kind.parse().map_err(|e: String| anyhow::anyhow!(e))?;
                if name.trim().is_empty() {
                    anyhow::bail!("Provider name must not be empty");
                }
                let settings = match settings {
                    Some(json) => serde_json::from_str(&json).context("Settings must be JSON")?,
                    None => serde_json::Value::Null,
                };

                let mut config = load_config(&config_path)?;
                if config.providers.iter().any(|p| p.matches_name(&name)) {
                    anyhow::bail!("Provider '{}' already exists", name);
                }

                config.providers.push(
                    ProviderRecord::new(kind, name.clone())
                        .with_visibility(visibility)
                        .with_settings(settings),
                );
                config.save(&config_path)?;

                println!("Added {} provider '{}'", kind, name);
            }
            ProviderAction::Remove { name } => {
                let mut config = load_config(&config_path)?;
                let before = config.providers.len();
                config.providers.retain(|p| !p.matches_name(&name));
                if config.providers.len() == before {
                    anyhow::bail!("Provider '{}' not found", name);
                }
                config.save(&config_path)?;

                println!("Removed provider '{}'", name);
            }
            ProviderAction::List => {
                let config = load_config(&config_path)?;
                if config.providers.is_empty() {
                    println!("No providers configured.");
                } else {
                    println!("Providers ({}):", config.providers.len());
                    for provider in &config.providers {
                        let visibility = if provider.visibility.is_empty() {
                            "-"
                        } else {
                            provider.visibility.as_str()
                        };
                        println!("  {} [{}] ({})", provider.name, provider.kind, visibility);
                    }
                }
            }
        },

        Commands::Mounts => {
            let cloud = build_cloud(&config_path)?;
            let mounts = cloud.mounts();

            println!("Node: {}", cloud.node_name());
            if mounts.is_empty() {
                println!("No mounts.");
            } else {
                println!("Mounts ({}):", mounts.len());
                for mount in mounts {
                    println!("  {}", mount);
                }
            }
        }

        Commands::Ls { path } => {
            let cloud = build_cloud(&config_path)?;
            let entries = match cloud.resolve(&path) {
                Some(resolved) => resolved.entry.list(&resolved.remainder).await?,
                None if path.trim_matches('/').is_empty() => cloud.list_root(),
                None => anyhow::bail!("No such mount: {}", path),
            };

            for entry in entries {
                match entry.file_type {
                    FileType::Directory => println!("{}/", entry.name),
                    FileType::File => println!("{}", entry.name),
                }
            }
        }

        Commands::Cat { path } => {
            let cloud = build_cloud(&config_path)?;
            let resolved = cloud
                .resolve(&path)
                .ok_or_else(|| anyhow::anyhow!("No such mount: {}", path))?;
            let data = resolved.entry.read(&resolved.remainder).await?;
            print!("{}", String::from_utf8_lossy(&data));
        }
    }

    Ok(())
}
