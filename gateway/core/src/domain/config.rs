// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration
//
// YAML document describing one twinport endpoint:
// - listen address and credential paths
// - client certificate policy, minimum TLS version, ALPN list
// - liveness path and optional server-auth-only health listener
// - request deadline cap and message size limit
// - REST route table (defaults to the service definition when empty)

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::context::ApplicationProtocol;
use super::routes::{RouteError, RouteSpec, RouteTable};

pub const CONFIG_ENV_VAR: &str = "TWINPORT_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "twinport.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid route: {0}")]
    Route(#[from] RouteError),
}

/// Which clients may complete a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthPolicy {
    /// No client certificate is requested.
    None,
    /// A certificate is requested; if presented it must verify.
    RequestOnly,
    /// A certificate chaining to a trust anchor is mandatory.
    #[default]
    RequireAndVerify,
}

impl std::str::FromStr for ClientAuthPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Ok(Self::None),
            "request_only" | "optional" => Ok(Self::RequestOnly),
            "require_and_verify" | "required" => Ok(Self::RequireAndVerify),
            other => Err(ConfigError::Invalid(format!(
                "unknown client auth policy {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsVersion {
    #[default]
    Tls12,
    Tls13,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsSettings {
    pub cert: PathBuf,
    pub key: PathBuf,
    /// CA bundle holding the trust anchors for client certificates.
    pub ca: PathBuf,

    #[serde(default)]
    pub client_auth: ClientAuthPolicy,

    #[serde(default)]
    pub min_version: TlsVersion,

    /// Ordered ALPN identifiers; the native RPC id comes first by default.
    #[serde(default = "default_alpn")]
    pub alpn: Vec<String>,

    #[serde(default = "default_handshake_timeout", with = "humantime_serde")]
    pub handshake_timeout: Duration,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            cert: PathBuf::from("./tls/server.crt"),
            key: PathBuf::from("./tls/server.key"),
            ca: PathBuf::from("./tls/ca.crt"),
            client_auth: ClientAuthPolicy::default(),
            min_version: TlsVersion::default(),
            alpn: default_alpn(),
            handshake_timeout: default_handshake_timeout(),
        }
    }
}

impl TlsSettings {
    pub fn alpn_protocols(&self) -> Vec<Vec<u8>> {
        self.alpn.iter().map(|p| p.as_bytes().to_vec()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    #[serde(default = "default_health_path")]
    pub path: String,

    /// Optional extra listener that serves only the liveness path and
    /// does not ask for client certificates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<SocketAddr>,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            path: default_health_path(),
            listen: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    #[serde(default)]
    pub tls: TlsSettings,

    #[serde(default)]
    pub health: HealthSettings,

    /// Upper bound on every call's deadline.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Largest accepted request message or native frame, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteSpec>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            tls: TlsSettings::default(),
            health: HealthSettings::default(),
            request_timeout: default_request_timeout(),
            max_message_size: default_max_message_size(),
            routes: Vec::new(),
        }
    }
}

impl GatewayConfig {
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&source)
    }

    /// Resolve the configuration file.
    ///
    /// Order: `explicit`, `$TWINPORT_CONFIG`, `./twinport.yaml`, defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Self::load(Path::new(&path));
            }
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            return Self::load(local);
        }
        tracing::debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tls.alpn.is_empty() {
            return Err(ConfigError::Invalid("tls.alpn must not be empty".into()));
        }
        if let Some(bad) = self.tls.alpn.iter().find(|p| p.is_empty() || p.len() > 255) {
            return Err(ConfigError::Invalid(format!(
                "ALPN identifier {bad:?} must be 1-255 bytes"
            )));
        }
        let serves_http = self.tls.alpn.iter().any(|p| {
            ApplicationProtocol::from_alpn(Some(p.as_bytes())) != ApplicationProtocol::NativeRpc
        });
        if !serves_http {
            tracing::warn!("ALPN list advertises only the native RPC protocol; REST clients will be refused");
        }
        if !self.health.path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "health.path {:?} must start with '/'",
                self.health.path
            )));
        }
        // The health path is mounted as a literal router path: no captures
        // or wildcards.
        let pattern_like = self.health.path.contains(['{', '}'])
            || self
                .health
                .path
                .split('/')
                .any(|segment| segment.starts_with([':', '*']));
        if pattern_like {
            return Err(ConfigError::Invalid(format!(
                "health.path {:?} must be a literal path without '{{', '}}', ':' or '*' segments",
                self.health.path
            )));
        }
        if self.health.listen == Some(self.listen) && self.listen.port() != 0 {
            return Err(ConfigError::Invalid(
                "health.listen must differ from listen".into(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid("max_message_size must be positive".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid("request_timeout must be positive".into()));
        }
        RouteTable::new(&self.routes)?;
        Ok(())
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 4444))
}

fn default_alpn() -> Vec<String> {
    ApplicationProtocol::default_advertised()
        .into_iter()
        .map(|p| String::from_utf8_lossy(&p).into_owned())
        .collect()
}

fn default_handshake_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_health_path() -> String {
    "/healthz".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_message_size() -> usize {
    4 * 1024 * 1024
}
