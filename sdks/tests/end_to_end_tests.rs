// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Full round trips through a real gateway on a loopback port: mutual TLS,
//! ALPN, demultiplexing, dispatch and translation.

#[path = "../../gateway/core/tests/common/mod.rs"]
mod common;

use async_trait::async_trait;
use bytes::Bytes;
use common::TestPki;
use http::{Method, StatusCode};
use prost::Message;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use twinport_core::application::ping_service::{self, PingMessage};
use twinport_core::domain::config::GatewayConfig;
use twinport_core::domain::context::CallContext;
use twinport_core::domain::registry::{MethodRegistry, RpcHandler};
use twinport_core::infrastructure::trust_store::TrustMaterial;
use twinport_core::presentation::server::{GatewayServer, ServerError};
use twinport_sdk::{ClientError, GatewayClient, Transport};

struct Running {
    addr: SocketAddr,
    health_addr: Option<SocketAddr>,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<(), ServerError>>,
}

async fn start(pki: &TestPki, configure: impl FnOnce(&mut GatewayConfig)) -> Running {
    let registry = ping_service::register(MethodRegistry::builder()).unwrap().build();
    start_with(pki, configure, registry).await
}

async fn start_with(
    pki: &TestPki,
    configure: impl FnOnce(&mut GatewayConfig),
    registry: MethodRegistry,
) -> Running {
    let server = pki.server();
    let mut config = GatewayConfig::default();
    config.listen = "127.0.0.1:0".parse().unwrap();
    config.tls.cert = server.cert_path;
    config.tls.key = server.key_path;
    config.tls.ca = pki.ca_path.clone();
    configure(&mut config);
    config.validate().unwrap();

    let material = TrustMaterial::load(&config.tls.cert, &config.tls.key, &config.tls.ca).unwrap();
    let gateway = GatewayServer::bind(&config, &material, registry).await.unwrap();
    let addr = gateway.local_addr().unwrap();
    let health_addr = gateway.health_addr();
    let shutdown = gateway.shutdown_token();
    let handle = tokio::spawn(gateway.serve());
    Running {
        addr,
        health_addr,
        shutdown,
        handle,
    }
}

/// Answers `proto.Ping`-shaped requests after a fixed delay.
struct Delayed(Duration);

#[async_trait]
impl RpcHandler for Delayed {
    type Request = PingMessage;
    type Response = PingMessage;

    async fn call(&self, _ctx: CallContext, req: PingMessage) -> anyhow::Result<PingMessage> {
        tokio::time::sleep(self.0).await;
        Ok(PingMessage::new(format!("late {}", req.greeting)))
    }
}

fn client(pki: &TestPki, addr: SocketAddr) -> GatewayClient {
    let alice = pki.client("alice");
    GatewayClient::from_files(
        addr.to_string(),
        "localhost",
        Some((alice.cert_path.as_path(), alice.key_path.as_path())),
        &pki.ca_path,
    )
    .unwrap()
}

#[tokio::test]
async fn test_say_hello_over_every_transport() {
    let pki = TestPki::new();
    let gateway = start(&pki, |_| {}).await;
    let client = client(&pki, gateway.addr);

    for transport in [Transport::Native, Transport::Grpc, Transport::Rest] {
        let reply = client.say_hello(transport, "ping").await.unwrap();
        assert_eq!(reply, "pong", "{transport:?}");
    }
}

#[tokio::test]
async fn test_transports_run_concurrently() {
    let pki = TestPki::new();
    let gateway = start(&pki, |_| {}).await;
    let client = client(&pki, gateway.addr);

    let (native, grpc, rest) = tokio::join!(
        client.say_hello(Transport::Native, "a"),
        client.say_hello(Transport::Grpc, "b"),
        client.say_hello(Transport::Rest, "c"),
    );
    assert_eq!(native.unwrap(), "pong");
    assert_eq!(grpc.unwrap(), "pong");
    assert_eq!(rest.unwrap(), "pong");
}

#[tokio::test]
async fn test_rest_post_ping_returns_json() {
    let pki = TestPki::new();
    let gateway = start(&pki, |_| {}).await;
    let response = client(&pki, gateway.addr)
        .rest(Method::POST, "/v1/ping", Some(&serde_json::json!({"greeting": "ping"})))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json::<serde_json::Value>().unwrap(), serde_json::json!({"greeting": "pong"}));
    assert!(response.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_rest_unknown_route_is_404_with_body() {
    let pki = TestPki::new();
    let gateway = start(&pki, |_| {}).await;
    let response = client(&pki, gateway.addr)
        .rest(Method::POST, "/v1/nonexistent", Some(&serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["code"], 5);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_rest_malformed_json_is_400() {
    let pki = TestPki::new();
    let gateway = start(&pki, |_| {}).await;
    let response = client(&pki, gateway.addr)
        .rest(Method::POST, "/v1/ping", Some(&serde_json::json!({"greeting": 7})))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_native_method_is_not_found() {
    let pki = TestPki::new();
    let gateway = start(&pki, |_| {}).await;
    let err = client(&pki, gateway.addr)
        .call_native("proto.Ping/Missing", Bytes::new())
        .await
        .unwrap_err();
    match err {
        ClientError::Status(status) => assert_eq!(status.code(), tonic::Code::NotFound),
        other => panic!("unexpected {other}"),
    }
}

#[tokio::test]
async fn test_health_on_main_listener_requires_certificate() {
    let pki = TestPki::new();
    let gateway = start(&pki, |_| {}).await;

    let response = client(&pki, gateway.addr)
        .rest(Method::GET, "/healthz", None)
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "imok");

    let anonymous =
        GatewayClient::from_files(gateway.addr.to_string(), "localhost", None, &pki.ca_path).unwrap();
    assert!(anonymous.rest(Method::GET, "/healthz", None).await.is_err());
}

#[tokio::test]
async fn test_separate_health_listener_needs_no_certificate() {
    let pki = TestPki::new();
    let gateway = start(&pki, |config| {
        config.health.path = "/ruok".into();
        config.health.listen = Some("127.0.0.1:0".parse().unwrap());
    })
    .await;
    let health_addr = gateway.health_addr.expect("health listener bound");

    let anonymous =
        GatewayClient::from_files(health_addr.to_string(), "localhost", None, &pki.ca_path).unwrap();
    let response = anonymous.rest(Method::GET, "/ruok", None).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "imok");

    let response = anonymous
        .rest(Method::POST, "/v1/ping", Some(&serde_json::json!({"greeting": "ping"})))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_client_without_certificate_is_refused() {
    let pki = TestPki::new();
    let gateway = start(&pki, |_| {}).await;
    let anonymous =
        GatewayClient::from_files(gateway.addr.to_string(), "localhost", None, &pki.ca_path).unwrap();
    assert!(anonymous.say_hello(Transport::Native, "ping").await.is_err());
    assert!(anonymous.say_hello(Transport::Grpc, "ping").await.is_err());
}

#[tokio::test]
async fn test_client_from_foreign_ca_is_refused() {
    let pki = TestPki::new();
    let gateway = start(&pki, |_| {}).await;
    let mallory = pki.foreign_client();
    let client = GatewayClient::from_files(
        gateway.addr.to_string(),
        "localhost",
        Some((mallory.cert_path.as_path(), mallory.key_path.as_path())),
        &pki.ca_path,
    )
    .unwrap();
    assert!(client.say_hello(Transport::Native, "ping").await.is_err());
}

#[tokio::test]
async fn test_repeated_calls_are_idempotent() {
    let pki = TestPki::new();
    let gateway = start(&pki, |_| {}).await;
    let client = client(&pki, gateway.addr);
    let first = client.say_hello(Transport::Grpc, "ping").await.unwrap();
    let second = client.say_hello(Transport::Grpc, "ping").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_shutdown_stops_the_server() {
    let pki = TestPki::new();
    let gateway = start(&pki, |_| {}).await;
    let client = client(&pki, gateway.addr);
    client.say_hello(Transport::Native, "ping").await.unwrap();

    gateway.shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), gateway.handle)
        .await
        .expect("server stopped")
        .unwrap();
    assert!(result.is_ok());
    assert!(client.say_hello(Transport::Native, "ping").await.is_err());
}

#[tokio::test]
async fn test_http1_connection_survives_an_error_response() {
    let pki = TestPki::new();
    let gateway = start(&pki, |_| {}).await;
    let mut connection = client(&pki, gateway.addr).connect_http1().await.unwrap();
    let ping = serde_json::json!({"greeting": "ping"});

    let missing = connection
        .send(Method::POST, "/v1/nonexistent", Some(&ping))
        .await
        .unwrap();
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let found = connection.send(Method::POST, "/v1/ping", Some(&ping)).await.unwrap();
    assert_eq!(found.status, StatusCode::OK);
    assert_eq!(found.json::<PingMessage>().unwrap().greeting, "pong");
}

#[tokio::test]
async fn test_rest_is_not_blocked_behind_a_slow_grpc_stream() {
    let pki = TestPki::new();
    let registry = ping_service::register(MethodRegistry::builder())
        .unwrap()
        .register("test.Delayed/Wait", Delayed(Duration::from_millis(500)))
        .unwrap()
        .build();
    let gateway = start_with(&pki, |_| {}, registry).await;
    let connection = client(&pki, gateway.addr).connect_http2().await.unwrap();

    let slow = connection.grpc_unary(
        "test.Delayed/Wait",
        Bytes::from(PingMessage::new("grpc").encode_to_vec()),
    );
    let body = serde_json::json!({"greeting": "ping"});
    let rest = connection.rest(Method::POST, "/v1/ping", Some(&body));
    tokio::pin!(slow);

    tokio::select! {
        biased;
        reply = &mut slow => panic!("slow gRPC call finished before REST: {reply:?}"),
        response = rest => {
            let response = response.unwrap();
            assert_eq!(response.status, StatusCode::OK);
            assert_eq!(response.json::<PingMessage>().unwrap().greeting, "pong");
        }
    }

    let reply = PingMessage::decode(slow.await.unwrap()).unwrap();
    assert_eq!(reply.greeting, "late grpc");
}
