// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # twinport
//!
//! One mutual-TLS port that serves native RPC, gRPC and REST.
//!
//! ## Commands
//!
//! - `twinport serve` - Run the gateway (config file plus flag overrides)
//! - `twinport call native|grpc|rest` - Dial a gateway and call `proto.Ping/SayHello`
//! - `twinport config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use twinport_cli::commands::{self, CallArgs, ConfigCommand, ServeArgs};

/// twinport - one port, three protocols, mutual TLS
#[derive(Parser)]
#[command(name = "twinport")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "TWINPORT_CONFIG",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TWINPORT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway
    #[command(name = "serve")]
    Serve(ServeArgs),

    /// Call proto.Ping/SayHello on a running gateway
    #[command(name = "call")]
    Call(CallArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Serve(args) => commands::serve::execute(args, cli.config).await,
        Commands::Call(args) => commands::call::execute(args, cli.config).await,
        Commands::Config { command } => commands::config::handle_command(command, cli.config).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
