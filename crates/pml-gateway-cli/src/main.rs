// crates/pml-gateway-cli/src/main.rs
// ============================================================================
// Module: PML Gateway CLI Entry Point
// Description: Command dispatcher for gateway serving and config checks.
// Purpose: Start the gateway with documented exit codes.
// Dependencies: clap, pml-gateway-mcp, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! The CLI starts the gateway over its transports and validates
//! configuration files. Exit codes are part of the public contract: `0` for
//! a normal exit, `1` for an unrecoverable initialization failure, and `2`
//! when the configured port is already in use. Environment variables
//! `GATEWAY_MODE`, `DOMAIN`, and `ADMIN_USERNAMES` override file values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

use pml_gateway_mcp::GatewayConfig;
use pml_gateway_mcp::GatewayServer;
use pml_gateway_mcp::server::ServeError;

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

/// Normal exit.
const EXIT_OK: u8 = 0;

/// Unrecoverable initialization failure (database, wiring, config).
const EXIT_INIT_FAILURE: u8 = 1;

/// The configured port is already in use.
const EXIT_PORT_IN_USE: u8 = 2;

// ============================================================================
// SECTION: CLI Definition
// ============================================================================

/// PML gateway command line.
#[derive(Debug, Parser)]
#[command(name = "pml-gateway", about = "Emergent-capability MCP gateway", version)]
struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Transport selection for `serve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
enum Transport {
    /// HTTP JSON-RPC plus the public routes.
    #[default]
    Http,
    /// MCP over process stdio.
    Stdio,
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Start the gateway.
    Serve {
        /// Configuration file path; defaults apply when absent.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Transport to serve.
        #[arg(long, value_enum, default_value_t = Transport::Http)]
        transport: Transport,
    },
    /// Validate a configuration file and exit.
    ConfigValidate {
        /// Configuration file path.
        config: PathBuf,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning a documented exit code.
#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Serve {
            config,
            transport,
        } => command_serve(config, transport).await,
        Command::ConfigValidate {
            config,
        } => command_config_validate(&config),
    };
    ExitCode::from(code)
}

/// Initializes the tracing subscriber from `RUST_LOG`.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Runs the gateway until interrupted.
async fn command_serve(config_path: Option<PathBuf>, transport: Transport) -> u8 {
    let config = match load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(message) => {
            tracing::error!(%message, "configuration rejected");
            return EXIT_INIT_FAILURE;
        }
    };
    let server = match GatewayServer::build(config).await {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "gateway initialization failed");
            return EXIT_INIT_FAILURE;
        }
    };
    let outcome = match transport {
        Transport::Http => {
            tokio::select! {
                outcome = server.serve_http() => outcome,
                _ = tokio::signal::ctrl_c() => Ok(()),
            }
        }
        Transport::Stdio => server.serve_stdio().await,
    };
    server.shutdown().await;
    match outcome {
        Ok(()) => EXIT_OK,
        Err(err) => exit_code_for(&err),
    }
}

/// Validates a configuration file.
fn command_config_validate(path: &std::path::Path) -> u8 {
    match load_config(Some(path)) {
        Ok(_) => EXIT_OK,
        Err(message) => {
            tracing::error!(%message, "configuration rejected");
            EXIT_INIT_FAILURE
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads the config file (or defaults) and applies environment overrides.
fn load_config(path: Option<&std::path::Path>) -> Result<GatewayConfig, String> {
    let config = match path {
        Some(path) => GatewayConfig::load(path).map_err(|err| err.to_string())?,
        None => GatewayConfig::default(),
    };
    config.apply_env(|name| std::env::var(name).ok()).map_err(|err| err.to_string())
}

/// Maps a serve error onto the documented exit codes.
fn exit_code_for(error: &ServeError) -> u8 {
    match error {
        ServeError::PortInUse(_) => EXIT_PORT_IN_USE,
        ServeError::Init(_) | ServeError::Serve(_) => EXIT_INIT_FAILURE,
    }
}

#[cfg(test)]
mod tests;
