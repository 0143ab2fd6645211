// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Connection and Call Contexts
//!
//! A [`ConnectionContext`] is created when a TLS handshake completes and
//! lives as long as the socket. Every request served on that socket gets
//! its own [`CallContext`], whose cancellation token is a child of the
//! connection's.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Per-connection and per-call state handed to handlers

use rustls::pki_types::CertificateDer;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::envelope::CorrelationId;

/// Application protocol agreed on during ALPN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationProtocol {
    /// Dedicated length-prefixed RPC framing.
    NativeRpc,
    Http2,
    Http11,
    /// The client did not offer ALPN; the HTTP layer sniffs the preface.
    Unspecified,
}

impl ApplicationProtocol {
    pub const NATIVE_RPC_ALPN: &'static [u8] = b"twinport-rpc/1";
    pub const HTTP2_ALPN: &'static [u8] = b"h2";
    pub const HTTP11_ALPN: &'static [u8] = b"http/1.1";

    pub fn from_alpn(alpn: Option<&[u8]>) -> Self {
        match alpn {
            Some(Self::NATIVE_RPC_ALPN) => Self::NativeRpc,
            Some(Self::HTTP2_ALPN) => Self::Http2,
            Some(Self::HTTP11_ALPN) => Self::Http11,
            _ => Self::Unspecified,
        }
    }

    pub fn alpn_id(self) -> Option<&'static [u8]> {
        match self {
            Self::NativeRpc => Some(Self::NATIVE_RPC_ALPN),
            Self::Http2 => Some(Self::HTTP2_ALPN),
            Self::Http11 => Some(Self::HTTP11_ALPN),
            Self::Unspecified => None,
        }
    }

    /// The full advertised list, native RPC first.
    pub fn default_advertised() -> Vec<Vec<u8>> {
        vec![
            Self::NATIVE_RPC_ALPN.to_vec(),
            Self::HTTP2_ALPN.to_vec(),
            Self::HTTP11_ALPN.to_vec(),
        ]
    }
}

/// The validated certificate a client presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    certificate: CertificateDer<'static>,
    fingerprint: String,
}

impl PeerIdentity {
    pub fn new(certificate: CertificateDer<'static>) -> Self {
        let fingerprint = hex::encode(Sha256::digest(certificate.as_ref()));
        Self {
            certificate,
            fingerprint,
        }
    }

    pub fn certificate(&self) -> &CertificateDer<'static> {
        &self.certificate
    }

    /// Lowercase hex SHA-256 of the DER certificate.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

#[derive(Debug)]
pub struct ConnectionContext {
    id: Uuid,
    peer_addr: SocketAddr,
    protocol: ApplicationProtocol,
    peer: Option<PeerIdentity>,
    cancellation: CancellationToken,
}

impl ConnectionContext {
    pub fn new(
        peer_addr: SocketAddr,
        protocol: ApplicationProtocol,
        peer: Option<PeerIdentity>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer_addr,
            protocol,
            peer,
            cancellation,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn protocol(&self) -> ApplicationProtocol {
        self.protocol
    }

    pub fn peer_identity(&self) -> Option<&PeerIdentity> {
        self.peer.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Derive the context for one call on this connection.
    pub fn call_context(
        &self,
        method: &str,
        correlation_id: CorrelationId,
        deadline: Option<Instant>,
    ) -> CallContext {
        CallContext {
            method: method.to_string(),
            correlation_id,
            connection_id: self.id,
            peer: self.peer.clone(),
            cancellation: self.cancellation.child_token(),
            deadline,
        }
    }
}

/// What a handler sees about the call it is serving.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub method: String,
    pub correlation_id: CorrelationId,
    pub connection_id: Uuid,
    pub peer: Option<PeerIdentity>,
    pub cancellation: CancellationToken,
    pub deadline: Option<Instant>,
}

impl CallContext {
    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<std::time::Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}
