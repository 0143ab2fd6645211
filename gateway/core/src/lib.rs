// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # twinport-core
//!
//! One TLS port, two application protocols. Native clients speak a binary
//! RPC protocol (either the dedicated `twinport-rpc/1` framing or gRPC over
//! HTTP/2); browsers and REST clients speak HTTP/JSON, which is translated
//! in-process into the same RPC calls.
//!
//! ```text
//! TCP -> MtlsListener -> Demultiplexer -+-> native framing --+
//!                                       +-> gRPC framing ----+-> Dispatcher -> handler
//!                                       +-> REST translator -+
//! ```
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Wires the domain, application, infrastructure and presentation layers

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
