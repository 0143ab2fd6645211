// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`twinport-core`)
//!
//! Wire surfaces that turn bytes into RPC envelopes. **No business logic
//! lives here**; every call is handed to the
//! [`Dispatcher`](crate::application::dispatcher::Dispatcher).
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`demux`] | TLS stream | Chooses native, gRPC or REST per connection and per request |
//! | [`native`] | `twinport-rpc/1` | Length-delimited protobuf frames |
//! | [`grpc`] | HTTP/2 | Unary gRPC framing with status trailers |
//! | [`api`] | HTTP/1.1, HTTP/2 (Axum) | Liveness route + REST translator fallback |
//! | [`health`] | HTTP (Axum) | Constant liveness body, standalone health router |
//! | [`server`] | TCP | Accept loops and graceful shutdown |

pub mod api;
pub mod demux;
pub mod grpc;
pub mod health;
pub mod native;
pub mod server;

pub use demux::{Demultiplexer, RequestSignature};
pub use server::{GatewayServer, ServerError};
