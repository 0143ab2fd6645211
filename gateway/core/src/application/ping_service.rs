// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Ping Service Definition
//!
//! The `proto.Ping` service: one unary method, `SayHello`, taking and
//! returning a `PingMessage { greeting }`. The message type is declared
//! with `prost` so the same struct decodes from protobuf (native and gRPC)
//! and from JSON (REST).
//!
//! The handler is the echo used by the reference deployment: it always
//! answers `pong`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::context::CallContext;
use crate::domain::registry::{MethodRegistryBuilder, RegistryError, RpcHandler};
use crate::domain::routes::RouteSpec;

pub const SERVICE_NAME: &str = "proto.Ping";
pub const SAY_HELLO: &str = "proto.Ping/SayHello";

#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct PingMessage {
    #[prost(string, tag = "1")]
    pub greeting: String,
}

impl PingMessage {
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            greeting: greeting.into(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PingService;

#[async_trait]
impl RpcHandler for PingService {
    type Request = PingMessage;
    type Response = PingMessage;

    async fn call(&self, ctx: CallContext, request: PingMessage) -> anyhow::Result<PingMessage> {
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            peer = ctx.peer.as_ref().map(|p| p.fingerprint()).unwrap_or("-"),
            "SayHello: received {}",
            request.greeting
        );
        Ok(PingMessage::new("pong"))
    }
}

/// Register every `proto.Ping` method.
pub fn register(builder: MethodRegistryBuilder) -> Result<MethodRegistryBuilder, RegistryError> {
    builder.register(SAY_HELLO, PingService)
}

/// HTTP bindings for `proto.Ping`.
pub fn routes() -> Vec<RouteSpec> {
    vec![
        RouteSpec::new("POST", "/v1/ping", SAY_HELLO, Some("*")),
        RouteSpec::new("GET", "/v1/ping/{greeting}", SAY_HELLO, None),
    ]
}
