// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! RPC Envelope
//!
//! The unit every front-end hands to the dispatcher: a method name, an
//! opaque payload and correlation metadata. One envelope per inbound call,
//! consumed exactly once.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;

/// Request/response body as received from the wire.
///
/// Native and gRPC callers send protobuf bytes; the REST translator builds a
/// JSON value. Handlers answer in the encoding they were called with.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Binary(Bytes),
    Json(serde_json::Value),
}

impl Payload {
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json(_))
    }

    pub fn into_binary(self) -> Option<Bytes> {
        match self {
            Self::Binary(bytes) => Some(bytes),
            Self::Json(_) => None,
        }
    }

    pub fn into_json(self) -> Option<serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Binary(_) => None,
        }
    }
}

/// Request identifier propagated from `x-request-id` or minted per call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Use the caller's identifier, or mint one when it is blank.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => Self(v.to_string()),
            _ => Self::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcEnvelope {
    /// Fully qualified method name, e.g. `proto.Ping/SayHello`.
    pub method: String,
    pub payload: Payload,
    pub correlation_id: CorrelationId,
    pub metadata: BTreeMap<String, String>,
}

impl RpcEnvelope {
    pub fn new(method: impl Into<String>, payload: Payload) -> Self {
        Self {
            method: method.into(),
            payload,
            correlation_id: CorrelationId::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Build the response envelope for this request.
    pub fn reply(&self, payload: Payload) -> Self {
        Self {
            method: self.method.clone(),
            payload,
            correlation_id: self.correlation_id.clone(),
            metadata: BTreeMap::new(),
        }
    }
}
