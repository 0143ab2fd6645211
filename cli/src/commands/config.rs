// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use twinport_core::domain::config::{GatewayConfig, CONFIG_ENV_VAR, DEFAULT_CONFIG_FILE};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Write the default configuration as YAML
    Generate {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override).as_deref()),
        ConfigCommand::Generate { output } => generate(&output),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = GatewayConfig::discover(config_override.as_deref())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. {CONFIG_ENV_VAR}: {}",
            std::env::var(CONFIG_ENV_VAR)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./{DEFAULT_CONFIG_FILE}");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();
    print!("{}", config.to_yaml()?);
    Ok(())
}

fn validate(config_path: Option<&Path>) -> Result<()> {
    println!("Validating configuration...");

    let config = GatewayConfig::discover(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;
    println!("  {} route(s)", config.routes.len());

    for (label, path) in [
        ("tls.cert", &config.tls.cert),
        ("tls.key", &config.tls.key),
        ("tls.ca", &config.tls.ca),
    ] {
        if !path.is_file() {
            println!(
                "{}",
                format!("⚠ {label} not found: {}", path.display()).yellow()
            );
        }
    }

    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

fn generate(output: &Path) -> Result<()> {
    let yaml = GatewayConfig::default().to_yaml()?;
    std::fs::write(output, yaml)
        .with_context(|| format!("Failed to write config to {}", output.display()))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );
    Ok(())
}
