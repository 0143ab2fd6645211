// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `twinport serve`
//!
//! Loads the configuration, applies command-line overrides and runs the
//! gateway until SIGINT or SIGTERM.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

use twinport_core::domain::config::{ClientAuthPolicy, GatewayConfig};
use twinport_core::presentation::GatewayServer;

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Address to listen on (overrides `listen`)
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,

    /// Server certificate chain, PEM
    #[arg(long, value_name = "FILE")]
    pub cert: Option<PathBuf>,

    /// Server private key, PEM
    #[arg(long, value_name = "FILE")]
    pub key: Option<PathBuf>,

    /// CA bundle for client certificates, PEM
    #[arg(long, value_name = "FILE")]
    pub ca: Option<PathBuf>,

    /// none, request-only or require-and-verify
    #[arg(long, value_name = "POLICY")]
    pub client_auth: Option<ClientAuthPolicy>,

    /// Separate listener for the liveness check, without client auth
    #[arg(long, value_name = "ADDR")]
    pub health_listen: Option<SocketAddr>,
}

impl ServeArgs {
    pub fn apply(self, config: &mut GatewayConfig) {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(cert) = self.cert {
            config.tls.cert = cert;
        }
        if let Some(key) = self.key {
            config.tls.key = key;
        }
        if let Some(ca) = self.ca {
            config.tls.ca = ca;
        }
        if let Some(policy) = self.client_auth {
            config.tls.client_auth = policy;
        }
        if let Some(addr) = self.health_listen {
            config.health.listen = Some(addr);
        }
    }
}

pub async fn execute(args: ServeArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut config = GatewayConfig::discover(config_path.as_deref())
        .context("Failed to load configuration")?;
    args.apply(&mut config);

    let server = GatewayServer::from_config(&config)
        .await
        .context("Failed to start gateway")?;

    let addr = server.local_addr()?;
    println!("{}", format!("✓ Listening on {addr}").green());
    if let Some(health) = server.health_addr() {
        println!("  Health check: https://{health}{}", config.health.path);
    }
    if config.tls.client_auth != ClientAuthPolicy::RequireAndVerify {
        println!(
            "{}",
            format!("  Client auth: {:?}", config.tls.client_auth).yellow()
        );
    }

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    server.serve().await.context("Gateway failed")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
