// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! RPC Dispatcher
//!
//! Resolves an envelope's method in the [`MethodRegistry`], runs the handler
//! exactly once under the call's deadline and cancellation token, and turns
//! whatever the handler raised into an [`RpcError`]. Both front-ends go
//! through here, so nothing handler-specific reaches the wire.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Shared RPC execution and error normalization boundary

use bytes::Bytes;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::domain::context::ConnectionContext;
use crate::domain::envelope::{Payload, RpcEnvelope};
use crate::domain::error::RpcError;
use crate::domain::registry::{InvocationError, MethodRegistry};

#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<MethodRegistry>,
    max_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(registry: Arc<MethodRegistry>) -> Self {
        Self {
            registry,
            max_timeout: None,
        }
    }

    /// Cap every call at `timeout`, whatever deadline the caller sent.
    pub fn with_max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Execute one call.
    ///
    /// Fails with `NotFound` before any handler runs if the method is not
    /// registered. A deadline that passes, or a connection that is torn down,
    /// while the handler is running aborts it with `DeadlineExceeded`.
    pub async fn dispatch(
        &self,
        mut envelope: RpcEnvelope,
        context: &ConnectionContext,
        deadline: Option<Instant>,
    ) -> Result<RpcEnvelope, RpcError> {
        let handler = self.registry.get(&envelope.method).ok_or_else(|| {
            debug!(method = %envelope.method, "Unknown RPC method");
            RpcError::not_found(format!("unknown method {}", envelope.method))
        })?;

        let deadline = self.effective_deadline(deadline);
        if deadline.is_some_and(|d| d <= Instant::now()) {
            return Err(RpcError::deadline_exceeded("deadline expired before dispatch"));
        }

        let call = context.call_context(&envelope.method, envelope.correlation_id.clone(), deadline);
        let cancellation = call.cancellation.clone();
        let started = Instant::now();

        debug!(
            method = %envelope.method,
            correlation_id = %envelope.correlation_id,
            connection_id = %context.id(),
            "Dispatching RPC"
        );

        let payload = std::mem::replace(&mut envelope.payload, Payload::Binary(Bytes::new()));
        let invocation = AssertUnwindSafe(handler.invoke(call, payload)).catch_unwind();
        let bounded = async {
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, invocation).await.ok(),
                None => Some(invocation.await),
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                warn!(method = %envelope.method, "Call cancelled by its connection");
                return Err(RpcError::deadline_exceeded("request cancelled"));
            }
            outcome = bounded => outcome,
        };

        let result = match outcome {
            None => Err(RpcError::deadline_exceeded(format!(
                "{} did not finish before its deadline",
                envelope.method
            ))),
            Some(Err(_panic)) => {
                error!(method = %envelope.method, "RPC handler panicked");
                Err(RpcError::internal("internal error"))
            }
            Some(Ok(Ok(payload))) => Ok(envelope.reply(payload)),
            Some(Ok(Err(failure))) => Err(normalize(&envelope.method, failure)),
        };

        debug!(
            method = %envelope.method,
            elapsed_ms = started.elapsed().as_millis() as u64,
            code = result.as_ref().err().map(|e| e.code.as_str()).unwrap_or("OK"),
            "RPC finished"
        );
        result
    }

    /// The caller's deadline clamped to the configured maximum. Front-ends
    /// resolve this before reading a request body so the read is bounded too.
    pub fn effective_deadline(&self, requested: Option<Instant>) -> Option<Instant> {
        let cap = self.max_timeout.map(|t| Instant::now() + t);
        match (requested, cap) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Map a handler failure onto the RPC taxonomy.
fn normalize(method: &str, failure: InvocationError) -> RpcError {
    match failure {
        InvocationError::Decode(err) => err,
        InvocationError::Encode(reason) => {
            error!(method, %reason, "Failed to encode RPC response");
            RpcError::internal("failed to encode response")
        }
        InvocationError::Handler(err) => {
            if let Some(rpc) = err.downcast_ref::<RpcError>() {
                return rpc.clone();
            }
            if let Some(status) = err.downcast_ref::<tonic::Status>() {
                return RpcError::from(status);
            }
            if err.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
                return RpcError::deadline_exceeded("handler timed out");
            }
            error!(method, error = %format!("{err:#}"), "RPC handler failed");
            RpcError::internal("internal error")
        }
    }
}
