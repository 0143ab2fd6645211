// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod grpc_codec;
pub mod listener;
pub mod native_codec;
pub mod tls;
pub mod trust_store;

pub use grpc_codec::BytesCodec;
pub use listener::{AuthenticatedStream, HandshakeError, ListenerError, MtlsListener, PendingConnection};
pub use tls::{TlsConfigError, TlsOptions};
pub use trust_store::{TrustMaterial, TrustStoreError};
