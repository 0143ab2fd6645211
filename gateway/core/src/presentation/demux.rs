// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Protocol Demultiplexer
//!
//! Chooses a decoder for an authenticated stream. The negotiated ALPN
//! identifier settles native RPC connections up front; everything else is
//! served as HTTP/1.1 or HTTP/2 and classified **per request**, because one
//! HTTP/2 connection may interleave gRPC and REST streams.
//!
//! | Signature | Destination |
//! |-----------|-------------|
//! | ALPN `twinport-rpc/1` | native framing |
//! | HTTP/2 + `application/grpc*` | gRPC framing |
//! | `application/grpc*` on HTTP/1.x | 404 |
//! | anything else | REST router |
//!
//! # Architecture
//!
//! - **Layer:** Presentation Layer
//! - **Purpose:** Per-connection and per-request routing between front-ends

use axum::body::Body;
use axum::response::IntoResponse;
use axum::Router;
use http::header::CONTENT_TYPE;
use http::{Request, Response, Version};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::{debug, info_span, Instrument};

use super::api;
use super::grpc::server::{GrpcService, GRPC_CONTENT_TYPE};
use super::native;
use crate::application::dispatcher::Dispatcher;
use crate::application::translator::{GatewayError, RestTranslator};
use crate::domain::context::{ApplicationProtocol, ConnectionContext};
use crate::infrastructure::listener::AuthenticatedStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestSignature {
    Grpc,
    Rest,
    /// Looks like binary RPC but cannot be served on this transport.
    Unsupported,
}

impl RequestSignature {
    pub fn classify<B>(request: &Request<B>) -> Self {
        let grpc_content = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with(GRPC_CONTENT_TYPE));
        match (request.version(), grpc_content) {
            (Version::HTTP_2, true) => Self::Grpc,
            (_, true) => Self::Unsupported,
            (_, false) => Self::Rest,
        }
    }
}

#[derive(Clone)]
pub struct Demultiplexer {
    dispatcher: Arc<Dispatcher>,
    grpc: GrpcService,
    rest: Router,
    max_message_size: usize,
}

impl Demultiplexer {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        translator: Arc<RestTranslator>,
        health_path: &str,
        max_message_size: usize,
    ) -> Self {
        Self {
            grpc: GrpcService::new(Arc::clone(&dispatcher), max_message_size),
            rest: api::router(translator, health_path),
            dispatcher,
            max_message_size,
        }
    }

    /// Serve one connection until the peer closes it or its context is
    /// cancelled.
    pub async fn serve_connection(&self, stream: AuthenticatedStream) {
        let (io, context) = stream.into_parts();
        let span = info_span!(
            "connection",
            connection_id = %context.id(),
            peer = %context.peer_addr(),
            protocol = ?context.protocol(),
        );

        async move {
            match context.protocol() {
                ApplicationProtocol::NativeRpc => {
                    native::serve(io, context, Arc::clone(&self.dispatcher), self.max_message_size)
                        .await
                }
                _ => {
                    let this = self.clone();
                    let cancellation = context.cancellation().clone();
                    serve_http(io, cancellation, move |request| {
                        let this = this.clone();
                        let context = Arc::clone(&context);
                        async move { this.route_request(request, context).await }
                    })
                    .await
                }
            }
        }
        .instrument(span)
        .await
    }

    pub async fn route_request(
        &self,
        mut request: Request<Body>,
        context: Arc<ConnectionContext>,
    ) -> Response<Body> {
        match RequestSignature::classify(&request) {
            RequestSignature::Grpc => self.grpc.handle(request, context).await,
            RequestSignature::Rest => {
                request.extensions_mut().insert(context);
                match self.rest.clone().oneshot(request).await {
                    Ok(response) => response,
                    Err(never) => match never {},
                }
            }
            RequestSignature::Unsupported => {
                debug!(
                    version = ?request.version(),
                    path = request.uri().path(),
                    "gRPC content type outside HTTP/2"
                );
                GatewayError::RouteNotFound {
                    method: request.method().to_string(),
                    path: request.uri().path().to_string(),
                }
                .into_response()
            }
        }
    }
}

/// Drive an HTTP/1.1 or HTTP/2 connection with `handler`, draining it
/// gracefully once `cancellation` fires.
pub(crate) async fn serve_http<S, H, Fut>(io: S, cancellation: CancellationToken, handler: H)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    H: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    let service = hyper::service::service_fn(move |request: Request<Incoming>| {
        let handler = handler.clone();
        async move { Ok::<_, Infallible>(handler(request.map(Body::new)).await) }
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let connection = builder.serve_connection(TokioIo::new(io), service);
    tokio::pin!(connection);

    tokio::select! {
        result = connection.as_mut() => {
            if let Err(e) = result {
                debug!(error = %e, "HTTP connection ended with an error");
            }
        }
        _ = cancellation.cancelled() => {
            connection.as_mut().graceful_shutdown();
            if let Err(e) = connection.await {
                debug!(error = %e, "HTTP connection failed while draining");
            }
        }
    }
}
