// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0

mod common;

use common::{Identity, TestPki};
use rustls::ClientConfig;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use twinport_core::domain::config::ClientAuthPolicy;
use twinport_core::domain::context::ApplicationProtocol;
use twinport_core::infrastructure::listener::{AuthenticatedStream, HandshakeError, MtlsListener};
use twinport_core::infrastructure::tls::{client_config, server_config, server_name, TlsOptions};
use twinport_core::infrastructure::trust_store::{load_trust_anchors, TrustMaterial};

async fn listener(pki: &TestPki, options: TlsOptions) -> MtlsListener {
    let server = pki.server();
    let material = TrustMaterial::load(&server.cert_path, &server.key_path, &pki.ca_path).unwrap();
    let config = server_config(&material, &options).unwrap();
    MtlsListener::bind("127.0.0.1:0".parse().unwrap(), config, &options)
        .await
        .unwrap()
}

fn dialer(pki: &TestPki, identity: Option<&Identity>, alpn: &[&[u8]]) -> Arc<ClientConfig> {
    let anchors = load_trust_anchors(&pki.ca_path).unwrap();
    let identity = identity.map(|id| {
        TrustMaterial::load(&id.cert_path, &id.key_path, &pki.ca_path)
            .unwrap()
            .client_identity()
    });
    client_config(anchors, identity, alpn.iter().map(|p| p.to_vec()).collect()).unwrap()
}

async fn handshake(
    listener: &MtlsListener,
    client: Arc<ClientConfig>,
) -> Result<AuthenticatedStream, HandshakeError> {
    let addr = listener.local_addr().unwrap();
    let connector = TlsConnector::from(client);
    let client = async move {
        let tcp = TcpStream::connect(addr).await.unwrap();
        // The client may or may not notice the server's rejection.
        connector.connect(server_name("localhost").unwrap(), tcp).await
    };
    let server = async {
        listener
            .accept()
            .await
            .unwrap()
            .handshake(&CancellationToken::new())
            .await
    };
    let (server, _client) = tokio::join!(server, client);
    server
}

#[tokio::test]
async fn test_valid_client_certificate_is_exposed() {
    let pki = TestPki::new();
    let client = pki.client("alice");
    let listener = listener(&pki, TlsOptions::default()).await;

    let stream = handshake(&listener, dialer(&pki, Some(&client), &[b"twinport-rpc/1"]))
        .await
        .unwrap();
    let context = stream.context();
    assert_eq!(context.protocol(), ApplicationProtocol::NativeRpc);

    let identity = context.peer_identity().expect("peer certificate");
    let expected = hex::encode(Sha256::digest(identity.certificate().as_ref()));
    assert_eq!(identity.fingerprint(), expected);
}

#[tokio::test]
async fn test_alpn_selects_http() {
    let pki = TestPki::new();
    let client = pki.client("alice");
    let listener = listener(&pki, TlsOptions::default()).await;

    let h2 = handshake(&listener, dialer(&pki, Some(&client), &[b"h2"])).await.unwrap();
    assert_eq!(h2.context().protocol(), ApplicationProtocol::Http2);

    let h1 = handshake(&listener, dialer(&pki, Some(&client), &[b"http/1.1"])).await.unwrap();
    assert_eq!(h1.context().protocol(), ApplicationProtocol::Http11);

    let none = handshake(&listener, dialer(&pki, Some(&client), &[])).await.unwrap();
    assert_eq!(none.context().protocol(), ApplicationProtocol::Unspecified);
}

#[tokio::test]
async fn test_missing_client_certificate_is_rejected() {
    let pki = TestPki::new();
    let listener = listener(&pki, TlsOptions::default()).await;
    let err = handshake(&listener, dialer(&pki, None, &[b"h2"])).await.unwrap_err();
    assert!(matches!(err, HandshakeError::Tls { .. }), "{err}");
}

#[tokio::test]
async fn test_expired_client_certificate_is_rejected() {
    let pki = TestPki::new();
    let expired = pki.expired_client();
    let listener = listener(&pki, TlsOptions::default()).await;
    let err = handshake(&listener, dialer(&pki, Some(&expired), &[b"h2"])).await.unwrap_err();
    assert!(matches!(err, HandshakeError::Tls { .. }), "{err}");
}

#[tokio::test]
async fn test_foreign_client_certificate_is_rejected() {
    let pki = TestPki::new();
    let foreign = pki.foreign_client();
    let listener = listener(&pki, TlsOptions::default()).await;

    let anchors = load_trust_anchors(&pki.ca_path).unwrap();
    let identity = TrustMaterial::from_pem(
        foreign.cert_pem.as_bytes(),
        foreign.key_pem.as_bytes(),
        pki.ca_pem.as_bytes(),
    )
    .unwrap()
    .client_identity();
    let config = client_config(anchors, Some(identity), vec![b"h2".to_vec()]).unwrap();

    let err = handshake(&listener, config).await.unwrap_err();
    assert!(matches!(err, HandshakeError::Tls { .. }), "{err}");
}

#[tokio::test]
async fn test_request_only_accepts_anonymous_clients() {
    let pki = TestPki::new();
    let options = TlsOptions {
        client_auth: ClientAuthPolicy::RequestOnly,
        ..TlsOptions::default()
    };
    let listener = listener(&pki, options).await;
    let stream = handshake(&listener, dialer(&pki, None, &[b"http/1.1"])).await.unwrap();
    assert!(stream.context().peer_identity().is_none());
}

#[tokio::test]
async fn test_silent_client_times_out() {
    let pki = TestPki::new();
    let options = TlsOptions {
        handshake_timeout: Duration::from_millis(200),
        ..TlsOptions::default()
    };
    let listener = listener(&pki, options).await;
    let addr = listener.local_addr().unwrap();

    let _idle = TcpStream::connect(addr).await.unwrap();
    let err = listener
        .accept()
        .await
        .unwrap()
        .handshake(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, HandshakeError::Timeout { .. }), "{err}");
}

#[tokio::test]
async fn test_shutdown_abandons_pending_handshake() {
    let pki = TestPki::new();
    let listener = listener(&pki, TlsOptions::default()).await;
    let addr = listener.local_addr().unwrap();

    let _idle = TcpStream::connect(addr).await.unwrap();
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let err = listener.accept().await.unwrap().handshake(&shutdown).await.unwrap_err();
    assert!(matches!(err, HandshakeError::Cancelled { .. }), "{err}");
}
