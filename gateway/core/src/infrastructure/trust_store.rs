// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Trust Store
//!
//! Loads the listener's identity (certificate chain + private key) and the
//! CA bundle whose certificates anchor peer validation. Everything is read
//! once at startup and never refreshed; the resulting [`TrustMaterial`] is
//! immutable and shared read-only by every connection task.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** PEM decoding of identity and trust anchors via `rustls-pemfile`

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::RootCertStore;
use std::fmt;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use super::tls::crypto_provider;

#[derive(Debug, thiserror::Error)]
pub enum TrustStoreError {
    /// A file is missing, unreadable, or does not decode as a certificate or key.
    #[error("configuration error in {origin}: {reason}")]
    Configuration { origin: String, reason: String },

    /// The CA bundle yielded no usable trust anchor.
    #[error("trust chain error in {origin}: {reason}")]
    TrustChain { origin: String, reason: String },
}

impl TrustStoreError {
    fn configuration(origin: &str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            origin: origin.to_string(),
            reason: reason.into(),
        }
    }
}

/// Identity material plus trust anchors.
pub struct TrustMaterial {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    anchors: Arc<RootCertStore>,
}

impl fmt::Debug for TrustMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustMaterial")
            .field("chain_len", &self.chain.len())
            .field("anchors", &self.anchors.len())
            .finish_non_exhaustive()
    }
}

impl TrustMaterial {
    pub fn load(cert_path: &Path, key_path: &Path, ca_path: &Path) -> Result<Self, TrustStoreError> {
        let cert = read_file(cert_path)?;
        let key = read_file(key_path)?;
        let ca = read_file(ca_path)?;
        Self::decode(
            (&cert, &cert_path.display().to_string()),
            (&key, &key_path.display().to_string()),
            (&ca, &ca_path.display().to_string()),
        )
    }

    /// Build from in-memory PEM documents.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8], ca_pem: &[u8]) -> Result<Self, TrustStoreError> {
        Self::decode(
            (cert_pem, "identity certificate"),
            (key_pem, "identity key"),
            (ca_pem, "CA bundle"),
        )
    }

    fn decode(
        (cert_pem, cert_origin): (&[u8], &str),
        (key_pem, key_origin): (&[u8], &str),
        (ca_pem, ca_origin): (&[u8], &str),
    ) -> Result<Self, TrustStoreError> {
        let chain = decode_certificates(cert_pem, cert_origin)?;
        if chain.is_empty() {
            return Err(TrustStoreError::configuration(cert_origin, "no certificate found"));
        }
        let key = decode_private_key(key_pem, key_origin)?;
        let anchors = decode_trust_anchors(ca_pem, ca_origin)?;
        Ok(Self {
            chain,
            key,
            anchors,
        })
    }

    /// Leaf first, followed by any intermediates from the certificate file.
    pub fn identity_chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    pub fn identity_key(&self) -> PrivateKeyDer<'static> {
        self.key.clone_key()
    }

    pub fn trust_anchors(&self) -> Arc<RootCertStore> {
        Arc::clone(&self.anchors)
    }

    /// The identity as a dialer presents it.
    pub fn client_identity(&self) -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
        (self.chain.clone(), self.identity_key())
    }
}

/// Load a CA bundle on its own, for dialers that present no identity.
pub fn load_trust_anchors(ca_path: &Path) -> Result<Arc<RootCertStore>, TrustStoreError> {
    let pem = read_file(ca_path)?;
    decode_trust_anchors(&pem, &ca_path.display().to_string())
}

fn read_file(path: &Path) -> Result<Vec<u8>, TrustStoreError> {
    std::fs::read(path).map_err(|e| TrustStoreError::configuration(&path.display().to_string(), e.to_string()))
}

fn decode_certificates(pem: &[u8], origin: &str) -> Result<Vec<CertificateDer<'static>>, TrustStoreError> {
    rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrustStoreError::configuration(origin, format!("invalid PEM: {e}")))
}

fn decode_private_key(pem: &[u8], origin: &str) -> Result<PrivateKeyDer<'static>, TrustStoreError> {
    let key = rustls_pemfile::private_key(&mut BufReader::new(pem))
        .map_err(|e| TrustStoreError::configuration(origin, format!("invalid PEM: {e}")))?
        .ok_or_else(|| TrustStoreError::configuration(origin, "no private key found"))?;

    // Reject keys the crypto provider cannot sign with now rather than at
    // the first handshake.
    crypto_provider()
        .key_provider
        .load_private_key(key.clone_key())
        .map_err(|e| TrustStoreError::configuration(origin, format!("unusable private key: {e}")))?;
    Ok(key)
}

fn decode_trust_anchors(pem: &[u8], origin: &str) -> Result<Arc<RootCertStore>, TrustStoreError> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem))
        .filter_map(Result::ok)
        .collect::<Vec<_>>();
    let mut store = RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(TrustStoreError::TrustChain {
            origin: origin.to_string(),
            reason: format!("no parseable CA certificate ({ignored} rejected)"),
        });
    }
    if ignored > 0 {
        tracing::warn!(origin, ignored, "Skipped unparseable certificates in CA bundle");
    }
    Ok(Arc::new(store))
}
