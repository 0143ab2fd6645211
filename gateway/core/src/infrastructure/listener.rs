// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Mutual-TLS Listener
//!
//! Binds one TCP port and performs the TLS server handshake on every
//! accepted socket. Accepting and handshaking are split so the accept loop
//! never waits on a slow peer: [`MtlsListener::accept`] returns a
//! [`PendingConnection`] which the caller handshakes on its own task.
//!
//! A failed handshake is reported once as a [`HandshakeError`] and the socket
//! is dropped; the listener never retries.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** TCP accept + `tokio-rustls` handshake producing a [`ConnectionContext`]

use rustls::ServerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::tls::TlsOptions;
use crate::domain::config::ClientAuthPolicy;
use crate::domain::context::{ApplicationProtocol, ConnectionContext, PeerIdentity};

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("listener has no local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("TLS handshake with {peer} failed: {source}")]
    Tls {
        peer: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake with {peer} did not complete within {timeout:?}")]
    Timeout { peer: SocketAddr, timeout: Duration },

    #[error("{peer} completed the handshake without a client certificate")]
    MissingClientCertificate { peer: SocketAddr },

    #[error("handshake with {peer} abandoned during shutdown")]
    Cancelled { peer: SocketAddr },
}

pub struct MtlsListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    client_auth: ClientAuthPolicy,
    handshake_timeout: Duration,
}

impl MtlsListener {
    pub async fn bind(
        addr: SocketAddr,
        config: Arc<ServerConfig>,
        options: &TlsOptions,
    ) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;
        info!(
            addr = %listener.local_addr().map_err(ListenerError::LocalAddr)?,
            client_auth = ?options.client_auth,
            "TLS listener bound"
        );
        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(config),
            client_auth: options.client_auth,
            handshake_timeout: options.handshake_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ListenerError> {
        self.listener.local_addr().map_err(ListenerError::LocalAddr)
    }

    pub async fn accept(&self) -> Result<PendingConnection, ListenerError> {
        let (stream, peer_addr) = self.listener.accept().await.map_err(ListenerError::Accept)?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer_addr, error = %e, "Failed to set TCP_NODELAY");
        }
        Ok(PendingConnection {
            stream,
            peer_addr,
            acceptor: self.acceptor.clone(),
            client_auth: self.client_auth,
            handshake_timeout: self.handshake_timeout,
        })
    }
}

/// An accepted TCP socket that has not yet completed TLS.
pub struct PendingConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    acceptor: TlsAcceptor,
    client_auth: ClientAuthPolicy,
    handshake_timeout: Duration,
}

impl PendingConnection {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Run the server handshake. The connection's cancellation token is a
    /// child of `shutdown`.
    pub async fn handshake(
        self,
        shutdown: &CancellationToken,
    ) -> Result<AuthenticatedStream, HandshakeError> {
        let peer = self.peer_addr;
        let accept = tokio::time::timeout(self.handshake_timeout, self.acceptor.accept(self.stream));

        let stream = tokio::select! {
            _ = shutdown.cancelled() => return Err(HandshakeError::Cancelled { peer }),
            result = accept => result
                .map_err(|_| HandshakeError::Timeout { peer, timeout: self.handshake_timeout })?
                .map_err(|source| HandshakeError::Tls { peer, source })?,
        };

        let (_, session) = stream.get_ref();
        let protocol = ApplicationProtocol::from_alpn(session.alpn_protocol());
        let peer_identity = session
            .peer_certificates()
            .and_then(|chain| chain.first())
            .map(|leaf| PeerIdentity::new(leaf.clone().into_owned()));

        if peer_identity.is_none() && self.client_auth == ClientAuthPolicy::RequireAndVerify {
            return Err(HandshakeError::MissingClientCertificate { peer });
        }

        let context = ConnectionContext::new(peer, protocol, peer_identity, shutdown.child_token());
        debug!(
            connection_id = %context.id(),
            %peer,
            ?protocol,
            fingerprint = context.peer_identity().map(|p| p.fingerprint()).unwrap_or("-"),
            "TLS handshake complete"
        );

        Ok(AuthenticatedStream {
            stream,
            context: Arc::new(context),
        })
    }
}

/// A TLS stream whose handshake succeeded, with its connection context.
#[derive(Debug)]
pub struct AuthenticatedStream {
    stream: TlsStream<TcpStream>,
    context: Arc<ConnectionContext>,
}

impl AuthenticatedStream {
    pub fn context(&self) -> &Arc<ConnectionContext> {
        &self.context
    }

    pub fn into_parts(self) -> (TlsStream<TcpStream>, Arc<ConnectionContext>) {
        (self.stream, self.context)
    }
}
