// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `twinport call`: a diagnostic client for `proto.Ping/SayHello`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use twinport_core::domain::config::GatewayConfig;
use twinport_sdk::{GatewayClient, Transport};

#[derive(Args, Debug)]
pub struct CallArgs {
    /// native, grpc or rest
    #[arg(value_name = "TRANSPORT")]
    pub transport: Transport,

    #[arg(long, default_value = "ping")]
    pub greeting: String,

    /// Gateway address (default: the configured listen address)
    #[arg(long, value_name = "HOST:PORT")]
    pub address: Option<String>,

    /// Name to verify in the server certificate
    #[arg(long, default_value = "localhost")]
    pub server_name: String,

    /// Client certificate chain, PEM
    #[arg(long, value_name = "FILE", requires = "key")]
    pub cert: Option<PathBuf>,

    /// Client private key, PEM
    #[arg(long, value_name = "FILE", requires = "cert")]
    pub key: Option<PathBuf>,

    /// CA bundle the server certificate must chain to (default: `tls.ca`)
    #[arg(long, value_name = "FILE")]
    pub ca: Option<PathBuf>,

    /// Call timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub timeout_ms: u64,
}

pub async fn execute(args: CallArgs, config_path: Option<PathBuf>) -> Result<()> {
    let needs_config = args.address.is_none() || args.ca.is_none();
    let config = if needs_config {
        GatewayConfig::discover(config_path.as_deref()).context("Failed to load configuration")?
    } else {
        GatewayConfig::default()
    };

    let address = args.address.unwrap_or_else(|| config.listen.to_string());
    let ca = args.ca.unwrap_or(config.tls.ca);
    let identity = args.cert.as_deref().zip(args.key.as_deref());

    let client = GatewayClient::from_files(address.clone(), &args.server_name, identity, &ca)
        .context("Failed to build client")?
        .with_timeout(Duration::from_millis(args.timeout_ms));

    let started = Instant::now();
    let reply = client
        .say_hello(args.transport, &args.greeting)
        .await
        .with_context(|| format!("{:?} call to {address} failed", args.transport))?;

    println!(
        "{} {} ({:?}, {} ms)",
        "✓".green(),
        reply.bold(),
        args.transport,
        started.elapsed().as_millis()
    );
    Ok(())
}
