use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cosigner_crypto::{decode_key_hex, PublicKeyId};
use cosigner_resolver::{
    MemoryUserKeyStore, MirrorNetwork, MirrorNodeClient, SigningRequirementResolver, UserKeyStore,
};
use cosigner_types::Config;
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "cosigner",
    about = "Work out which keys still have to sign a multi-party transaction",
    version,
    author
)]
struct Cli {
    #[arg(long, global = true, help = "Emit logs as JSON")]
    json_logs: bool,

    #[arg(
        long,
        global = true,
        value_name = "LEVEL",
        help = "Log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Decode a protobuf-encoded key and print its structure")]
    InspectKey {
        #[arg(value_name = "HEX", help = "Hex-encoded key")]
        key: String,
    },

    #[command(about = "Shorten a key to the available keys that satisfy it")]
    Shorten {
        #[arg(value_name = "HEX", help = "Hex-encoded key")]
        key: String,

        #[arg(long, value_name = "KEY", num_args = 1.., help = "Available public keys (hex)")]
        available: Vec<String>,
    },

    #[command(about = "List the caller keys that still have to sign a transaction")]
    Required {
        #[arg(long, value_name = "HEX", help = "Hex-encoded signed transaction")]
        tx: String,

        #[arg(long, value_name = "FILE", help = "JSON file with the caller's keys")]
        keys: PathBuf,

        #[arg(
            long,
            value_name = "KEY",
            num_args = 1..,
            help = "Public keys that already signed (hex)"
        )]
        signed: Vec<String>,

        #[arg(long, value_name = "NAME", help = "Mirror network name or URL")]
        network: Option<String>,

        #[arg(long, value_name = "FILE", help = "Configuration file path")]
        config: Option<PathBuf>,
    },

    #[command(about = "Configuration management")]
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    #[command(about = "Display version information")]
    Version,
}

#[derive(Subcommand)]
enum ConfigCommands {
    #[command(about = "Show current configuration")]
    Show {
        #[arg(long, value_name = "FILE", help = "Configuration file path")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::InspectKey { key } => {
            setup_logging(&Config::default(), &cli.log_level, cli.json_logs)?;
            inspect_key_command(&key)
        }
        Commands::Shorten { key, available } => {
            setup_logging(&Config::default(), &cli.log_level, cli.json_logs)?;
            shorten_command(&key, &available)
        }
        Commands::Required {
            tx,
            keys,
            signed,
            network,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            setup_logging(&config, &cli.log_level, cli.json_logs)?;
            required_command(&config, &tx, &keys, &signed, network).await
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show { config } => {
                let config = load_config(config.as_deref())?;
                show_config(&config)
            }
        },
        Commands::Version => version_command(),
    }
}

fn inspect_key_command(key: &str) -> Result<()> {
    let tree = decode_key_hex(key, cosigner_crypto::MAX_KEY_DEPTH)?;
    let output = json!({
        "tree": tree,
        "keys": tree.flatten(),
        "leaf_count": tree.leaf_count(),
        "depth": tree.depth(),
        "threshold": tree.threshold_of(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn shorten_command(key: &str, available: &[String]) -> Result<()> {
    let tree = decode_key_hex(key, cosigner_crypto::MAX_KEY_DEPTH)?;
    let available = parse_keys(available)?;

    let covering = tree
        .covering_keys(&available)
        .ok_or_else(|| anyhow::anyhow!("threshold cannot be satisfied"))?;
    for key in covering {
        println!("{key}");
    }
    Ok(())
}

async fn required_command(
    config: &Config,
    tx: &str,
    keys_path: &Path,
    signed: &[String],
    network: Option<String>,
) -> Result<()> {
    let tx_bytes = hex::decode(tx.trim().trim_start_matches("0x"))
        .context("transaction is not valid hex")?;

    let keys_json = std::fs::read_to_string(keys_path)
        .with_context(|| format!("failed to read {}", keys_path.display()))?;
    let caller_keys = MemoryUserKeyStore::from_json(&keys_json)?.all_keys().await?;

    let already_signed = parse_keys(signed)?;
    let network =
        MirrorNetwork::new(network.unwrap_or_else(|| config.mirror.default_network.clone()));

    let fetcher = MirrorNodeClient::new(config.mirror.clone(), config.resolver.max_key_depth)?;
    let resolver = SigningRequirementResolver::new(Arc::new(fetcher), config.resolver.clone());

    tracing::info!(%network, keys = caller_keys.len(), "resolving signing requirements");
    let report = resolver
        .report(&tx_bytes, &network, &already_signed, &caller_keys)
        .await
        .map_err(|e| anyhow::anyhow!("{} failed (code {}): {}", e.stage(), e.code(), e))?;

    let output = json!({
        "required": report.required_ids(),
        "executable": report.is_executable(),
        "expired": report.expired,
        "entities": report.entities,
        "skipped": report.skipped,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

fn version_command() -> Result<()> {
    println!("cosigner {}", env!("CARGO_PKG_VERSION"));
    println!("build: {}", env!("CARGO_PKG_NAME"));
    Ok(())
}

// Helper functions

fn setup_logging(config: &Config, level: &Option<String>, json_logs: bool) -> Result<()> {
    let level = level.as_deref().unwrap_or(&config.log.level);
    cosigner_log::init_tracing_with_level(level, json_logs || config.log.json)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

fn parse_keys(keys: &[String]) -> Result<HashSet<PublicKeyId>> {
    keys.iter()
        .map(|k| PublicKeyId::from_hex(k).with_context(|| format!("invalid public key '{k}'")))
        .collect()
}
