// ============================================
// File: crates/tunhub-server/src/main.rs
// ============================================
//! # TunHub Server Entry Point
//!
//! ## Creation Reason
//! Main entry point for the TunHub tunnel server binary.
//! Handles CLI parsing, logging setup, and server initialization.
//!
//! ## Main Functionality
//! - CLI argument parsing with clap
//! - Logging initialization from `logging.level`
//! - Configuration loading and validation
//! - Server execution
//!
//! ## Usage
//! ```bash
//! tunhub-server start                      # Run in the foreground
//! tunhub-server validate                   # Validate config file
//! tunhub-server validate --json            # Print effective config as JSON
//! tunhub-server validate --toml            # Print effective config as TOML
//! tunhub-server gateway                    # Show host default gateway
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Server requires root or `CAP_NET_ADMIN` for TUN
//! - `RUST_LOG` overrides `logging.level`
//! - Use systemd for production deployments
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use tunhub_server::logging::init_logging;
use tunhub_server::{Server, ServerConfig, ServerError};

// ============================================
// CLI Definition
// ============================================

/// TunHub tunnel server
///
/// Multiplexes IP traffic between a TUN device and TCP peers.
#[derive(Parser, Debug)]
#[command(name = "tunhub-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server in the foreground
    Start {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/tunhub/server.toml", env = "TUNHUB_CONFIG")]
        config: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/tunhub/server.toml", env = "TUNHUB_CONFIG")]
        config: PathBuf,

        /// Print the effective configuration as JSON
        #[arg(long, conflicts_with = "toml")]
        json: bool,

        /// Print the effective configuration as TOML
        #[arg(long)]
        toml: bool,
    },

    /// Show the host's current default gateway
    Gateway,
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Execute command
    let result = match cli.command {
        Commands::Start { config } => cmd_start(config).await,
        Commands::Validate { config, json, toml } => cmd_validate(config, json, toml).await,
        Commands::Gateway => cmd_gateway().await,
    };

    // Logging may not be installed yet, so report on stderr
    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        if let Some(hint) = e.downcast_ref::<ServerError>().and_then(error_hint) {
            eprintln!("Hint:  {hint}");
        }
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Starts the server.
async fn cmd_start(config_path: PathBuf) -> anyhow::Result<()> {
    let config = load_or_default_config(&config_path).await?;

    // One subscriber per process, at the configured level
    init_logging(&config.logging.level)?;

    info!("════════════════════════════════════════");
    info!("Listen:     {}", config.network.listen_addr);
    info!("Device:     {} ({})", config.tun.device_name, config.tun.address);
    info!("MTU:        {}", config.tun.mtu);
    info!("On failure: {}", config.tun.on_device_failure);
    info!("Log level:  {}", config.logging.level);
    info!("════════════════════════════════════════");

    let server = Server::new(config);
    server.run().await?;

    Ok(())
}

/// Validates configuration file.
async fn cmd_validate(config_path: PathBuf, json: bool, toml: bool) -> anyhow::Result<()> {
    let config = load_or_default_config(&config_path).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    if toml {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    println!("✅ Configuration is valid");
    println!();
    println!("Network:");
    println!("   Listen:        {}", config.network.listen_addr);
    println!();
    println!("TUN:");
    println!("   Device:        {}", config.tun.device_name);
    println!("   Address:       {}", config.tun.address);
    println!(
        "   Network:       {} netmask {}",
        config.tun.address.network(),
        config.tun.address.netmask()
    );
    println!("   MTU:           {}", config.tun.mtu);
    println!("   TX Queue:      {}", config.tun.tx_queue_len);
    println!("   On Failure:    {}", config.tun.on_device_failure);
    println!();
    println!("Routes:");
    match config.routes.default_gateway {
        Some(gateway) => println!("   Gateway:       {gateway}"),
        None => println!("   Gateway:       (unchanged)"),
    }
    for route in &config.routes.static_routes {
        println!("   Route:         {} via {}", route.destination, route.via);
    }
    println!();
    println!("Limits:");
    println!("   Inbound Queue: {}", config.limits.inbound_queue);
    println!("   Device Queue:  {}", config.limits.device_queue);
    println!("   Client Queue:  {}", config.limits.client_queue);
    println!("   Accept Poll:   {}ms", config.limits.accept_poll_ms);
    println!("   Grace Period:  {}s", config.limits.shutdown_grace_secs);
    println!();

    Ok(())
}

/// Shows the host default gateway.
#[cfg(target_os = "linux")]
async fn cmd_gateway() -> anyhow::Result<()> {
    use tunhub_transport::{IpCommandConfigurator, RouteConfigurator};

    init_logging("warn")?;

    let (gateway, device) = IpCommandConfigurator.default_gateway().await?;
    println!("{gateway} dev {device}");
    Ok(())
}

/// Shows the host default gateway.
#[cfg(not(target_os = "linux"))]
async fn cmd_gateway() -> anyhow::Result<()> {
    anyhow::bail!("reading the default gateway is only supported on Linux")
}

// ============================================
// Helper Functions
// ============================================

/// Suggests a fix for errors the operator can act on.
fn error_hint(error: &ServerError) -> Option<&'static str> {
    if error.requires_privileges() {
        Some("run as root or grant the binary CAP_NET_ADMIN")
    } else if error.is_config_error() {
        Some("check the file with `tunhub-server validate --config <path>`")
    } else {
        None
    }
}

/// Loads config, or the defaults if the file does not exist.
async fn load_or_default_config(path: &Path) -> anyhow::Result<ServerConfig> {
    if path.exists() {
        Ok(ServerConfig::load(path).await?)
    } else {
        eprintln!("⚠️  Config file not found: {}", path.display());
        eprintln!("   Server will use default values.");
        Ok(ServerConfig::default())
    }
}
