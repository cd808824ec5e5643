//! Configuration loading and parsing.
//!
//! This module handles loading configuration from files, environment variables,
//! and command-line arguments, with proper precedence handling.

use anyhow::{Context, Result};
use clap::Parser;
use config::Config as ConfigLoader;
use std::path::Path;

use super::DemoConfig;

/// Command-line interface for the demo.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file (TOML format)
    #[arg(long, short = 'c', default_value = "srtnet.toml")]
    pub config: String,

    /// Host for both the server listener and the clients (overrides config file)
    #[arg(long)]
    pub host: Option<String>,

    /// Port for both the server listener and the clients (overrides config file)
    #[arg(long)]
    pub port: Option<u16>,

    /// Log level (overrides config file)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Number of demo clients (overrides config file)
    #[arg(long)]
    pub clients: Option<usize>,

    /// Packets per client (overrides config file)
    #[arg(long)]
    pub packets: Option<usize>,

    /// Validate configuration and exit
    #[arg(long)]
    pub validate: bool,

    /// Print default configuration and exit
    #[arg(long)]
    pub print_default_config: bool,
}

/// Load and parse the demo configuration from the process arguments.
///
/// Precedence, lowest first:
/// 1. Default values
/// 2. Configuration file
/// 3. Environment variables (`SRTNET_` prefix)
/// 4. Command-line arguments
///
/// `--print-default-config` and `--validate` exit the process after doing
/// their job.
pub fn load_config() -> Result<DemoConfig> {
    let cli = CliArgs::parse();

    if cli.print_default_config {
        print_default_config()?;
        std::process::exit(0);
    }

    let config = resolve_config(&cli)?;

    if cli.validate {
        println!("✓ Configuration is valid");
        std::process::exit(0);
    }

    Ok(config)
}

/// Build and validate the configuration for already parsed arguments.
pub fn resolve_config(cli: &CliArgs) -> Result<DemoConfig> {
    let mut config = load_config_file(&cli.config)?;

    apply_env_overrides(&mut config)?;
    apply_cli_overrides(&mut config, cli);

    config.validate().map_err(|errors| {
        anyhow::anyhow!("Configuration validation failed:\n{}", errors.join("\n"))
    })?;

    Ok(config)
}

/// Load configuration from a TOML file. A missing file yields the defaults.
fn load_config_file(path: &str) -> Result<DemoConfig> {
    let path_obj = Path::new(path);

    if !path_obj.exists() {
        tracing::warn!(
            config_path = %path,
            "Configuration file not found, using defaults"
        );
        return Ok(DemoConfig::default());
    }

    let config_str = std::fs::read_to_string(path_obj)
        .with_context(|| format!("Failed to read config file: {}", path))?;

    toml::from_str(&config_str).with_context(|| format!("Failed to parse TOML config: {}", path))
}

/// Apply environment variable overrides.
///
/// Environment variables are prefixed with `SRTNET_` and use `__` as a separator.
///
/// Examples:
/// - `SRTNET_SERVER__PORT=9000`
/// - `SRTNET_GLOBAL__LOGGING__LEVEL=debug`
fn apply_env_overrides(config: &mut DemoConfig) -> Result<()> {
    let env_config = ConfigLoader::builder()
        .add_source(config::Environment::with_prefix("SRTNET").separator("__"))
        .build()
        .context("Failed to load environment variables")?;

    if let Ok(host) = env_config.get_string("server.host") {
        config.server.host = host;
    }
    if let Ok(port) = env_config.get_int("server.port") {
        config.server.port = port as u16;
    }
    if let Ok(host) = env_config.get_string("client.host") {
        config.client.host = host;
    }
    if let Ok(port) = env_config.get_int("client.port") {
        config.client.port = port as u16;
    }
    if let Ok(psk) = env_config.get_string("link.psk") {
        config.server.link.psk = psk.clone();
        config.client.link.psk = psk;
    }
    if let Ok(level) = env_config.get_string("global.logging.level") {
        if let Ok(parsed_level) = level.parse() {
            config.global.logging.level = parsed_level;
        }
    }
    if let Ok(clients) = env_config.get_int("demo.clients") {
        config.demo.clients = clients.max(0) as usize;
    }

    Ok(())
}

/// Apply command-line argument overrides.
///
/// `--host` and `--port` move both ends so the demo clients follow the server.
fn apply_cli_overrides(config: &mut DemoConfig, cli: &CliArgs) {
    if let Some(ref host) = cli.host {
        config.server.host = host.clone();
        config.client.host = host.clone();
    }

    if let Some(port) = cli.port {
        config.server.port = port;
        config.client.port = port;
    }

    if let Some(ref level_str) = cli.log_level {
        if let Ok(level) = level_str.parse() {
            config.global.logging.level = level;
        } else {
            tracing::warn!(level = %level_str, "Invalid log level specified, ignoring");
        }
    }

    if let Some(clients) = cli.clients {
        config.demo.clients = clients;
    }
    if let Some(packets) = cli.packets {
        config.demo.packets = packets;
    }
}

/// Print the default configuration in TOML format.
fn print_default_config() -> Result<()> {
    let default_config = DemoConfig::default();
    let toml_str =
        toml::to_string_pretty(&default_config).context("Failed to serialize default config")?;
    println!("{}", toml_str);
    Ok(())
}
