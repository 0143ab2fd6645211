// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0

//! gRPC unary calls over HTTP/2
//! tonic owns the framing, size limits and status trailers; each call is
//! handed to the dispatcher through a [`UnaryService`] over raw bytes.

use axum::body::Body;
use bytes::Bytes;
use http::header::HeaderMap;
use http::{Method, Request, Response};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tonic::codegen::BoxFuture;
use tonic::server::{Grpc, UnaryService};
use tonic::Status;
use tracing::debug;

use crate::application::dispatcher::Dispatcher;
use crate::application::translator::REQUEST_ID_HEADER;
use crate::domain::context::ConnectionContext;
use crate::domain::envelope::{CorrelationId, Payload, RpcEnvelope};
use crate::domain::error::RpcError;
use crate::domain::registry::method_from_path;
use crate::domain::timeout::{parse_grpc_timeout, GRPC_TIMEOUT_HEADER};
use crate::infrastructure::grpc_codec::BytesCodec;

pub const GRPC_CONTENT_TYPE: &str = "application/grpc";

/// Headers that describe the transport rather than the call.
fn is_reserved_header(name: &str) -> bool {
    name.starts_with("grpc-")
        || name.ends_with("-bin")
        || matches!(
            name,
            "content-type" | "te" | "user-agent" | "host" | "accept-encoding" | REQUEST_ID_HEADER
        )
}

#[derive(Debug, Clone)]
pub struct GrpcService {
    dispatcher: Arc<Dispatcher>,
    max_message_size: usize,
}

impl GrpcService {
    pub fn new(dispatcher: Arc<Dispatcher>, max_message_size: usize) -> Self {
        Self {
            dispatcher,
            max_message_size,
        }
    }

    /// Serve one unary call. The HTTP status is always 200; the outcome
    /// travels in `grpc-status`.
    pub async fn handle(&self, request: Request<Body>, context: Arc<ConnectionContext>) -> Response<Body> {
        if request.method() != Method::POST {
            return status_response(RpcError::unimplemented("gRPC requires POST"));
        }
        let Some(method) = method_from_path(request.uri().path()).map(str::to_string) else {
            return status_response(RpcError::unimplemented(format!(
                "malformed gRPC path {}",
                request.uri().path()
            )));
        };

        let headers = request.headers();
        let requested = headers
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_grpc_timeout)
            .map(|timeout| Instant::now() + timeout);
        let deadline = self.dispatcher.effective_deadline(requested);

        let call = DispatchCall {
            dispatcher: Arc::clone(&self.dispatcher),
            context,
            method,
            deadline,
            correlation_id: CorrelationId::from_header(
                headers.get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok()),
            ),
            metadata: call_metadata(headers).collect(),
        };

        let mut grpc = Grpc::new(BytesCodec).max_decoding_message_size(self.max_message_size);
        let response = match deadline {
            // Covers the body read as well as the handler.
            Some(deadline) => match tokio::time::timeout_at(deadline, grpc.unary(call, request)).await {
                Ok(response) => response,
                Err(_) => {
                    return status_response(RpcError::deadline_exceeded(
                        "deadline expired before the request message arrived",
                    ))
                }
            },
            None => grpc.unary(call, request).await,
        };
        response.map(Body::new)
    }
}

/// One call's routing state, consumed by tonic once the message is decoded.
struct DispatchCall {
    dispatcher: Arc<Dispatcher>,
    context: Arc<ConnectionContext>,
    method: String,
    deadline: Option<Instant>,
    correlation_id: CorrelationId,
    metadata: BTreeMap<String, String>,
}

impl UnaryService<Bytes> for DispatchCall {
    type Response = Bytes;
    type Future = BoxFuture<tonic::Response<Bytes>, Status>;

    fn call(&mut self, request: tonic::Request<Bytes>) -> Self::Future {
        let dispatcher = Arc::clone(&self.dispatcher);
        let context = Arc::clone(&self.context);
        let deadline = self.deadline;
        let mut envelope = RpcEnvelope::new(self.method.clone(), Payload::Binary(request.into_inner()))
            .with_correlation_id(self.correlation_id.clone());
        envelope.metadata.append(&mut self.metadata);

        Box::pin(async move {
            let reply = dispatcher
                .dispatch(envelope, &context, deadline)
                .await
                .and_then(|reply| {
                    reply
                        .payload
                        .into_binary()
                        .ok_or_else(|| RpcError::internal("handler answered with a JSON payload"))
                });
            match reply {
                Ok(message) => Ok(tonic::Response::new(message)),
                Err(err) => {
                    debug!(code = err.code.as_str(), message = %err.message, "gRPC call failed");
                    Err(err.into())
                }
            }
        })
    }
}

/// Trailers-only answer for calls that never reach tonic.
fn status_response(err: RpcError) -> Response<Body> {
    debug!(code = err.code.as_str(), message = %err.message, "gRPC call rejected");
    Status::from(err).into_http()
}

fn call_metadata(headers: &HeaderMap) -> impl Iterator<Item = (String, String)> + '_ {
    headers.iter().filter_map(|(name, value)| {
        if is_reserved_header(name.as_str()) {
            return None;
        }
        Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ping_service::{self, PingMessage};
    use crate::domain::context::ApplicationProtocol;
    use crate::domain::registry::MethodRegistry;
    use bytes::{BufMut, BytesMut};
    use http::header::{HeaderValue, CONTENT_TYPE};
    use http::Version;
    use http_body_util::BodyExt;
    use prost::Message;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn service() -> GrpcService {
        let registry = ping_service::register(MethodRegistry::builder()).unwrap().build();
        GrpcService::new(Arc::new(Dispatcher::new(Arc::new(registry))), 64)
    }

    fn connection() -> Arc<ConnectionContext> {
        Arc::new(ConnectionContext::new(
            "127.0.0.1:1".parse().unwrap(),
            ApplicationProtocol::Http2,
            None,
            CancellationToken::new(),
        ))
    }

    fn frame(flag: u8, message: &[u8]) -> Bytes {
        let mut frame = BytesMut::with_capacity(5 + message.len());
        frame.put_u8(flag);
        frame.put_u32(message.len() as u32);
        frame.put_slice(message);
        frame.freeze()
    }

    fn grpc_request(path: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method("POST")
            .version(Version::HTTP_2)
            .uri(path)
            .header(CONTENT_TYPE, GRPC_CONTENT_TYPE)
            .header("te", "trailers")
            .body(body)
            .unwrap()
    }

    /// Body plus the status headers, taken from the trailers or, for
    /// trailers-only answers, from the response headers.
    async fn run_with(service: GrpcService, request: Request<Body>) -> (Bytes, HeaderMap) {
        let response = service.handle(request, connection()).await;
        assert_eq!(response.status(), http::StatusCode::OK);
        let headers = response.headers().clone();
        let collected = response.into_body().collect().await.unwrap();
        let trailers = collected.trailers().cloned().unwrap_or_default();
        let status = if trailers.contains_key("grpc-status") { trailers } else { headers };
        (collected.to_bytes(), status)
    }

    async fn run(request: Request<Body>) -> (Bytes, HeaderMap) {
        run_with(service(), request).await
    }

    fn code(status: &HeaderMap) -> tonic::Code {
        let value = status["grpc-status"].to_str().unwrap().parse::<i32>().unwrap();
        tonic::Code::from_i32(value)
    }

    #[tokio::test]
    async fn test_say_hello_over_grpc() {
        let message = PingMessage::new("ping").encode_to_vec();
        let (body, status) = run(grpc_request("/proto.Ping/SayHello", Body::from(frame(0, &message)))).await;
        assert_eq!(code(&status), tonic::Code::Ok);
        assert_eq!(body[0], 0);
        let reply = PingMessage::decode(body.slice(5..)).unwrap();
        assert_eq!(reply.greeting, "pong");
    }

    #[tokio::test]
    async fn test_unknown_method_reports_not_found() {
        let (body, status) = run(grpc_request("/proto.Ping/Missing", Body::from(frame(0, b"")))).await;
        assert!(body.is_empty());
        assert_eq!(code(&status), tonic::Code::NotFound);
        let message = status["grpc-message"].to_str().unwrap();
        assert_eq!(
            percent_encoding::percent_decode_str(message).decode_utf8().unwrap(),
            "unknown method proto.Ping/Missing"
        );
    }

    #[tokio::test]
    async fn test_malformed_path_is_unimplemented() {
        let (_, status) = run(grpc_request("/no-slash-here", Body::from(frame(0, b"")))).await;
        assert_eq!(code(&status), tonic::Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_compressed_message_is_rejected() {
        let (body, status) = run(grpc_request("/proto.Ping/SayHello", Body::from(frame(1, b"\x0a\x01x")))).await;
        assert!(body.is_empty());
        assert_ne!(code(&status), tonic::Code::Ok);
    }

    #[tokio::test]
    async fn test_oversized_message_is_rejected() {
        let (body, status) = run(grpc_request("/proto.Ping/SayHello", Body::from(frame(0, &[0u8; 128])))).await;
        assert!(body.is_empty());
        assert_ne!(code(&status), tonic::Code::Ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_covers_a_stalled_request_body() {
        let registry = ping_service::register(MethodRegistry::builder()).unwrap().build();
        let dispatcher = Dispatcher::new(Arc::new(registry)).with_max_timeout(Duration::from_secs(1));
        let service = GrpcService::new(Arc::new(dispatcher), 64);

        let stalled = Body::from_stream(futures::stream::pending::<Result<Bytes, std::io::Error>>());
        let mut request = grpc_request("/proto.Ping/SayHello", stalled);
        request
            .headers_mut()
            .insert(GRPC_TIMEOUT_HEADER, HeaderValue::from_static("50m"));

        let started = Instant::now();
        let (_, status) = run_with(service, request).await;
        assert_eq!(code(&status), tonic::Code::DeadlineExceeded);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_grpc_message_is_percent_encoded() {
        let response = status_response(RpcError::invalid_argument("done\nnext: café"));
        let raw = response.headers()["grpc-message"].to_str().unwrap();
        assert!(!raw.contains('\n'));
        let decoded = percent_encoding::percent_decode_str(raw).decode_utf8().unwrap();
        assert_eq!(decoded, "done\nnext: café");
    }

    #[test]
    fn test_metadata_skips_reserved_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("te", HeaderValue::from_static("trailers"));
        headers.insert("grpc-timeout", HeaderValue::from_static("1S"));
        headers.insert("tenant", HeaderValue::from_static("acme"));
        headers.insert("trace-bin", HeaderValue::from_static("AAE="));
        let metadata: Vec<_> = call_metadata(&headers).collect();
        assert_eq!(metadata, vec![("tenant".to_string(), "acme".to_string())]);
    }
}
