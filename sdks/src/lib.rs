// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! twinport Rust SDK
//!
//! Dial a twinport gateway over mutual TLS and call it through any of its
//! three front-ends: native `twinport-rpc/1` frames, gRPC over HTTP/2, or
//! REST over HTTP/1.1.
//!
//! ```rust,ignore
//! use twinport_sdk::{GatewayClient, Transport};
//!
//! let client = GatewayClient::from_files(
//!     "localhost:4444",
//!     "localhost",
//!     Some((cert_path, key_path)),
//!     ca_path,
//! )?;
//! assert_eq!(client.say_hello(Transport::Native, "ping").await?, "pong");
//! ```

pub mod client;

pub use client::{ClientError, GatewayClient, Http2Connection, RestConnection, RestResponse, Transport};
pub use twinport_core::application::ping_service::PingMessage;
