// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! RPC Error Taxonomy
//!
//! Every request-level failure, whichever front-end received the request,
//! is expressed as an [`RpcError`]. The native and gRPC front-ends put the
//! [`tonic::Code`] on the wire; the REST front-end maps the code to an HTTP
//! status.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Normalization target for handler and decoding failures

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag carried by every request-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcCode {
    InvalidArgument,
    NotFound,
    DeadlineExceeded,
    PermissionDenied,
    Unauthenticated,
    Unimplemented,
    Unavailable,
    Internal,
}

impl RpcCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Unavailable => "UNAVAILABLE",
            Self::Internal => "INTERNAL",
        }
    }

    /// Wire code used by the native and gRPC front-ends.
    pub fn as_grpc(self) -> tonic::Code {
        match self {
            Self::InvalidArgument => tonic::Code::InvalidArgument,
            Self::NotFound => tonic::Code::NotFound,
            Self::DeadlineExceeded => tonic::Code::DeadlineExceeded,
            Self::PermissionDenied => tonic::Code::PermissionDenied,
            Self::Unauthenticated => tonic::Code::Unauthenticated,
            Self::Unimplemented => tonic::Code::Unimplemented,
            Self::Unavailable => tonic::Code::Unavailable,
            Self::Internal => tonic::Code::Internal,
        }
    }

    /// Collapse an arbitrary gRPC code into the taxonomy.
    ///
    /// Returns `None` for `Ok`. Cancellation is reported as a deadline
    /// expiry; codes without a counterpart become `Internal`.
    pub fn from_grpc(code: tonic::Code) -> Option<Self> {
        let mapped = match code {
            tonic::Code::Ok => return None,
            tonic::Code::InvalidArgument
            | tonic::Code::OutOfRange
            | tonic::Code::FailedPrecondition => Self::InvalidArgument,
            tonic::Code::NotFound => Self::NotFound,
            tonic::Code::DeadlineExceeded | tonic::Code::Cancelled => Self::DeadlineExceeded,
            tonic::Code::PermissionDenied => Self::PermissionDenied,
            tonic::Code::Unauthenticated => Self::Unauthenticated,
            tonic::Code::Unimplemented => Self::Unimplemented,
            tonic::Code::Unavailable | tonic::Code::ResourceExhausted => Self::Unavailable,
            _ => Self::Internal,
        };
        Some(mapped)
    }

    /// HTTP status used by the REST front-end.
    pub fn http_status(self) -> StatusCode {
        match self {
            Self::InvalidArgument => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for RpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged, wire-safe RPC failure.
///
/// Handlers may return this (wrapped in `anyhow::Error`) to choose the code
/// the caller sees.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RpcError {
    pub code: RpcCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: RpcCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(RpcCode::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RpcCode::NotFound, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(RpcCode::DeadlineExceeded, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(RpcCode::Unimplemented, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RpcCode::Internal, message)
    }

    /// Numeric wire code (the gRPC status value).
    pub fn wire_code(&self) -> i32 {
        self.code.as_grpc() as i32
    }
}

impl From<&tonic::Status> for RpcError {
    fn from(status: &tonic::Status) -> Self {
        let code = RpcCode::from_grpc(status.code()).unwrap_or(RpcCode::Internal);
        Self::new(code, status.message())
    }
}

impl From<RpcError> for tonic::Status {
    fn from(err: RpcError) -> Self {
        tonic::Status::new(err.code.as_grpc(), err.message)
    }
}
