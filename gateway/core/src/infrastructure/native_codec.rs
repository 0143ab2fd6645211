// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0

// Native RPC wire format (`twinport-rpc/1`).
//
// Each frame is a 4-byte big-endian length followed by one protobuf message.
// Clients send `NativeRequest`, the server answers each with a
// `NativeResponse` carrying the same correlation id. Responses may arrive in
// any order.

use bytes::Bytes;
use std::collections::BTreeMap;
use tokio_util::codec::LengthDelimitedCodec;

use crate::domain::envelope::{CorrelationId, Payload, RpcEnvelope};
use crate::domain::error::{RpcCode, RpcError};

pub const FRAME_HEADER_LEN: usize = 4;

#[derive(Clone, PartialEq, prost::Message)]
pub struct NativeRequest {
    #[prost(string, tag = "1")]
    pub correlation_id: String,
    /// `package.Service/Method`
    #[prost(string, tag = "2")]
    pub method: String,
    #[prost(bytes = "bytes", tag = "3")]
    pub payload: Bytes,
    /// Zero means no deadline from the client.
    #[prost(uint64, tag = "4")]
    pub timeout_ms: u64,
    #[prost(btree_map = "string, string", tag = "5")]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct NativeResponse {
    #[prost(string, tag = "1")]
    pub correlation_id: String,
    /// Numeric gRPC status code; 0 is success.
    #[prost(int32, tag = "2")]
    pub code: i32,
    #[prost(string, tag = "3")]
    pub message: String,
    #[prost(bytes = "bytes", tag = "4")]
    pub payload: Bytes,
}

pub fn frame_codec(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(FRAME_HEADER_LEN)
        .max_frame_length(max_frame_length)
        .new_codec()
}

impl NativeRequest {
    pub fn into_envelope(self) -> RpcEnvelope {
        let correlation_id = CorrelationId::from_header(Some(self.correlation_id.as_str()));
        let mut envelope = RpcEnvelope::new(self.method, Payload::Binary(self.payload))
            .with_correlation_id(correlation_id);
        envelope.metadata = self.metadata;
        envelope
    }
}

impl NativeResponse {
    pub fn success(envelope: RpcEnvelope) -> Self {
        let payload = match envelope.payload {
            Payload::Binary(bytes) => bytes,
            Payload::Json(value) => Bytes::from(value.to_string()),
        };
        Self {
            correlation_id: envelope.correlation_id.as_str().to_string(),
            code: 0,
            message: String::new(),
            payload,
        }
    }

    pub fn failure(correlation_id: impl Into<String>, error: &RpcError) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            code: error.wire_code(),
            message: error.message.clone(),
            payload: Bytes::new(),
        }
    }

    /// Split into the reply payload or the error it reports.
    pub fn into_result(self) -> Result<Bytes, RpcError> {
        if self.code == 0 {
            return Ok(self.payload);
        }
        let code = RpcCode::from_grpc(tonic::Code::from_i32(self.code)).unwrap_or(RpcCode::Internal);
        Err(RpcError::new(code, self.message))
    }
}
