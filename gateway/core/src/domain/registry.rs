// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Method Registry
//!
//! String-keyed table from fully qualified method names to handlers. Built
//! once at startup, read-only afterwards and shared by the dispatcher and
//! the REST translator.
//!
//! Handlers are written against the typed [`RpcHandler`] trait. The registry
//! stores them behind the object-safe [`MethodHandler`] seam, which decodes
//! the payload in whichever encoding the front-end produced (protobuf bytes
//! or JSON) and answers in the same encoding.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Name-to-handler resolution without an inheritance hierarchy

use async_trait::async_trait;
use bytes::Bytes;
use prost::Message;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::context::CallContext;
use super::envelope::Payload;
use super::error::RpcError;

/// A business handler for one RPC method.
#[async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    type Request: prost::Message + Default + DeserializeOwned + Send + 'static;
    type Response: prost::Message + Serialize + Send + 'static;

    async fn call(&self, ctx: CallContext, request: Self::Request)
        -> anyhow::Result<Self::Response>;
}

/// Failure inside a registered method, before normalization.
#[derive(Debug)]
pub enum InvocationError {
    /// The payload does not fit the method's request shape.
    Decode(RpcError),
    /// The response could not be serialized.
    Encode(String),
    /// The handler itself failed.
    Handler(anyhow::Error),
}

/// Type-erased handler stored in the registry.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Verify that `payload` decodes into the request shape.
    fn check(&self, payload: &Payload) -> Result<(), RpcError>;

    async fn invoke(&self, ctx: CallContext, payload: Payload) -> Result<Payload, InvocationError>;
}

struct TypedMethod<H>(H);

impl<H: RpcHandler> TypedMethod<H> {
    fn decode(payload: &Payload) -> Result<H::Request, RpcError> {
        match payload {
            Payload::Binary(bytes) => H::Request::decode(bytes.clone())
                .map_err(|e| RpcError::invalid_argument(format!("malformed request message: {e}"))),
            Payload::Json(value) => <H::Request as Deserialize>::deserialize(value)
                .map_err(|e| RpcError::invalid_argument(format!("request does not match schema: {e}"))),
        }
    }
}

#[async_trait]
impl<H: RpcHandler> MethodHandler for TypedMethod<H> {
    fn check(&self, payload: &Payload) -> Result<(), RpcError> {
        Self::decode(payload).map(|_| ())
    }

    async fn invoke(&self, ctx: CallContext, payload: Payload) -> Result<Payload, InvocationError> {
        let request = Self::decode(&payload).map_err(InvocationError::Decode)?;
        let response = self
            .0
            .call(ctx, request)
            .await
            .map_err(InvocationError::Handler)?;

        match payload {
            Payload::Binary(_) => Ok(Payload::Binary(Bytes::from(response.encode_to_vec()))),
            Payload::Json(_) => serde_json::to_value(&response)
                .map(Payload::Json)
                .map_err(|e| InvocationError::Encode(e.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("method {0:?} is already registered")]
    Duplicate(String),

    #[error("invalid method name {0:?}: expected `package.Service/Method`")]
    InvalidName(String),
}

#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    pub fn builder() -> MethodRegistryBuilder {
        MethodRegistryBuilder::default()
    }

    pub fn get(&self, method: &str) -> Option<Arc<dyn MethodHandler>> {
        self.methods.get(method).cloned()
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Registered names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.method_names())
            .finish()
    }
}

#[derive(Default)]
pub struct MethodRegistryBuilder {
    methods: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistryBuilder {
    pub fn register<H: RpcHandler>(
        self,
        method: impl Into<String>,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.register_erased(method, Arc::new(TypedMethod(handler)))
    }

    pub fn register_erased(
        mut self,
        method: impl Into<String>,
        handler: Arc<dyn MethodHandler>,
    ) -> Result<Self, RegistryError> {
        let method = method.into();
        validate_method_name(&method)?;
        if self.methods.contains_key(&method) {
            return Err(RegistryError::Duplicate(method));
        }
        self.methods.insert(method, handler);
        Ok(self)
    }

    pub fn build(self) -> MethodRegistry {
        MethodRegistry {
            methods: self.methods,
        }
    }
}

fn validate_method_name(name: &str) -> Result<(), RegistryError> {
    let valid = match name.split_once('/') {
        Some((service, method)) => {
            !service.is_empty()
                && !method.is_empty()
                && !method.contains('/')
                && !name.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidName(name.to_string()))
    }
}

/// Split a gRPC request path (`/pkg.Service/Method`) into a method name.
pub fn method_from_path(path: &str) -> Option<&str> {
    let name = path.strip_prefix('/')?;
    validate_method_name(name).ok().map(|_| name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::{ApplicationProtocol, ConnectionContext};
    use crate::domain::envelope::CorrelationId;
    use tokio_util::sync::CancellationToken;

    #[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
    #[serde(deny_unknown_fields, default)]
    struct Shout {
        #[prost(string, tag = "1")]
        text: String,
    }

    struct Upper;

    #[async_trait]
    impl RpcHandler for Upper {
        type Request = Shout;
        type Response = Shout;

        async fn call(&self, _ctx: CallContext, request: Shout) -> anyhow::Result<Shout> {
            Ok(Shout {
                text: request.text.to_uppercase(),
            })
        }
    }

    fn call_context() -> CallContext {
        ConnectionContext::new(
            "127.0.0.1:1".parse().unwrap(),
            ApplicationProtocol::Http2,
            None,
            CancellationToken::new(),
        )
        .call_context("test.Shout/Upper", CorrelationId::new(), None)
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = MethodRegistry::builder()
            .register("test.Shout/Upper", Upper)
            .and_then(|b| b.register("test.Shout/Upper", Upper));
        assert_eq!(
            result.err(),
            Some(RegistryError::Duplicate("test.Shout/Upper".to_string()))
        );
    }

    #[test]
    fn test_invalid_names_rejected() {
        for name in ["", "Upper", "/test.Shout/Upper", "test.Shout/", "a/b/c", "a b/c"] {
            assert!(
                matches!(
                    MethodRegistry::builder().register(name, Upper),
                    Err(RegistryError::InvalidName(_))
                ),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_method_from_path() {
        assert_eq!(method_from_path("/proto.Ping/SayHello"), Some("proto.Ping/SayHello"));
        assert_eq!(method_from_path("proto.Ping/SayHello"), None);
        assert_eq!(method_from_path("/proto.Ping"), None);
    }

    #[tokio::test]
    async fn test_answers_in_request_encoding() {
        let registry = MethodRegistry::builder()
            .register("test.Shout/Upper", Upper)
            .unwrap()
            .build();
        let handler = registry.get("test.Shout/Upper").unwrap();

        let json = handler
            .invoke(call_context(), Payload::Json(serde_json::json!({"text": "hi"})))
            .await
            .unwrap();
        assert_eq!(json, Payload::Json(serde_json::json!({"text": "HI"})));

        let request = Shout { text: "hi".into() }.encode_to_vec();
        let binary = handler
            .invoke(call_context(), Payload::Binary(Bytes::from(request)))
            .await
            .unwrap();
        let decoded = Shout::decode(binary.into_binary().unwrap()).unwrap();
        assert_eq!(decoded.text, "HI");
    }

    #[test]
    fn test_check_reports_schema_mismatch() {
        let registry = MethodRegistry::builder()
            .register("test.Shout/Upper", Upper)
            .unwrap()
            .build();
        let handler = registry.get("test.Shout/Upper").unwrap();
        let err = handler
            .check(&Payload::Json(serde_json::json!({"volume": 11})))
            .unwrap_err();
        assert_eq!(err.code, crate::domain::error::RpcCode::InvalidArgument);
        assert!(handler.check(&Payload::Json(serde_json::json!({}))).is_ok());
    }
}
