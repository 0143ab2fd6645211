// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! gRPC
//!
//! Unary gRPC calls arriving on an HTTP/2 stream whose `Content-Type` is
//! `application/grpc*`.
//!
//! # Architecture
//!
//! - **Layer:** Presentation Layer
//! - **Purpose:** Binary-RPC-over-HTTP/2 framing in front of the dispatcher

pub mod server;

pub use server::GrpcService;
