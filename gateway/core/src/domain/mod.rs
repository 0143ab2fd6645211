// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer (`twinport-core`)
//!
//! Transport-agnostic value types shared by every front-end.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`envelope`] | RPC Envelope and payload encodings |
//! | [`error`] | Normalized RPC error taxonomy |
//! | [`context`] | Connection and per-call contexts |
//! | [`registry`] | Method Registry and the handler trait |
//! | [`routes`] | Route Table for REST-to-RPC resolution |
//! | [`config`] | YAML gateway configuration |
//! | [`timeout`] | `grpc-timeout` header codec |

pub mod config;
pub mod context;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod routes;
pub mod timeout;

pub use context::{ApplicationProtocol, CallContext, ConnectionContext, PeerIdentity};
pub use envelope::{CorrelationId, Payload, RpcEnvelope};
pub use error::{RpcCode, RpcError};
pub use registry::{MethodRegistry, RpcHandler};
pub use routes::RouteTable;
