// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! rustls configuration for both ends of a twinport connection.
//!
//! The `ring` provider is passed explicitly everywhere so the process never
//! depends on a globally installed default.

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig, SupportedProtocolVersion};
use std::sync::Arc;
use std::time::Duration;

use super::trust_store::TrustMaterial;
use crate::domain::config::{ClientAuthPolicy, TlsSettings, TlsVersion};
use crate::domain::context::ApplicationProtocol;

#[derive(Debug, thiserror::Error)]
pub enum TlsConfigError {
    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("client certificate verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),

    #[error("invalid server name {0:?}")]
    ServerName(String),
}

pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Listener-side handshake options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    pub client_auth: ClientAuthPolicy,
    pub min_version: TlsVersion,
    /// Advertised ALPN identifiers in preference order.
    pub alpn: Vec<Vec<u8>>,
    pub handshake_timeout: Duration,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            client_auth: ClientAuthPolicy::RequireAndVerify,
            min_version: TlsVersion::Tls12,
            alpn: ApplicationProtocol::default_advertised(),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl TlsOptions {
    pub fn from_settings(settings: &TlsSettings) -> Self {
        Self {
            client_auth: settings.client_auth,
            min_version: settings.min_version,
            alpn: settings.alpn_protocols(),
            handshake_timeout: settings.handshake_timeout,
        }
    }

    /// Server-authenticated HTTP only; used by the standalone health listener.
    pub fn server_only(&self) -> Self {
        Self {
            client_auth: ClientAuthPolicy::None,
            alpn: vec![
                ApplicationProtocol::HTTP2_ALPN.to_vec(),
                ApplicationProtocol::HTTP11_ALPN.to_vec(),
            ],
            ..self.clone()
        }
    }
}

fn protocol_versions(min: TlsVersion) -> &'static [&'static SupportedProtocolVersion] {
    static ALL: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13, &rustls::version::TLS12];
    static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];
    match min {
        TlsVersion::Tls12 => ALL,
        TlsVersion::Tls13 => TLS13_ONLY,
    }
}

pub fn server_config(
    material: &TrustMaterial,
    options: &TlsOptions,
) -> Result<Arc<ServerConfig>, TlsConfigError> {
    let provider = crypto_provider();
    let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
        .with_protocol_versions(protocol_versions(options.min_version))?;

    let builder = match options.client_auth {
        ClientAuthPolicy::None => builder.with_no_client_auth(),
        ClientAuthPolicy::RequestOnly => {
            let verifier =
                WebPkiClientVerifier::builder_with_provider(material.trust_anchors(), provider)
                    .allow_unauthenticated()
                    .build()?;
            builder.with_client_cert_verifier(verifier)
        }
        ClientAuthPolicy::RequireAndVerify => {
            let verifier =
                WebPkiClientVerifier::builder_with_provider(material.trust_anchors(), provider)
                    .build()?;
            builder.with_client_cert_verifier(verifier)
        }
    };

    let mut config =
        builder.with_single_cert(material.identity_chain().to_vec(), material.identity_key())?;
    config.alpn_protocols = options.alpn.clone();
    Ok(Arc::new(config))
}

/// Dialer configuration. `identity` is the client certificate chain and key
/// presented for mutual authentication.
pub fn client_config(
    anchors: Arc<RootCertStore>,
    identity: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
    alpn: Vec<Vec<u8>>,
) -> Result<Arc<ClientConfig>, TlsConfigError> {
    let builder = ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(anchors);

    let mut config = match identity {
        Some((chain, key)) => builder.with_client_auth_cert(chain, key)?,
        None => builder.with_no_client_auth(),
    };
    config.alpn_protocols = alpn;
    Ok(Arc::new(config))
}

pub fn server_name(host: &str) -> Result<ServerName<'static>, TlsConfigError> {
    ServerName::try_from(host.to_string()).map_err(|_| TlsConfigError::ServerName(host.to_string()))
}
