// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::header::{HeaderMap, CONTENT_TYPE, HOST};
use http::uri::PathAndQuery;
use http::{Method, Request, StatusCode, Uri};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use prost::Message;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;
use tracing::debug;

use twinport_core::application::ping_service::{PingMessage, SAY_HELLO};
use twinport_core::application::translator::{ErrorBody, REQUEST_ID_HEADER};
use twinport_core::domain::context::ApplicationProtocol;
use twinport_core::domain::envelope::CorrelationId;
use twinport_core::infrastructure::grpc_codec::BytesCodec;
use twinport_core::infrastructure::native_codec::{frame_codec, NativeRequest, NativeResponse};
use twinport_core::infrastructure::tls::{client_config, server_name, TlsConfigError};
use twinport_core::infrastructure::trust_store::{load_trust_anchors, TrustMaterial, TrustStoreError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_MAX_FRAME: usize = 4 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    TrustStore(#[from] TrustStoreError),

    #[error(transparent)]
    Tls(#[from] TlsConfigError),

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("server did not agree on {0}")]
    Alpn(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("RPC failed: {0}")]
    Status(#[from] tonic::Status),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid protobuf message: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Front-end a call goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Native,
    Grpc,
    Rest,
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "grpc" => Ok(Self::Grpc),
            "rest" => Ok(Self::Rest),
            other => Err(format!("unknown transport {other:?}")),
        }
    }
}

/// Answer to a REST call, successful or not.
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RestResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Turn a non-2xx answer into the RPC status carried in its error body.
    pub fn error_for_status(self) -> Result<Self, ClientError> {
        if self.status.is_success() {
            return Ok(self);
        }
        match serde_json::from_slice::<ErrorBody>(&self.body) {
            Ok(err) => Err(tonic::Status::new(tonic::Code::from_i32(err.code), err.message).into()),
            Err(_) => Err(ClientError::Protocol(format!("HTTP {}: {}", self.status, self.text()))),
        }
    }
}

/// Dialer for one twinport endpoint. Every call opens its own connection.
#[derive(Clone)]
pub struct GatewayClient {
    address: String,
    server_name: ServerName<'static>,
    native: TlsConnector,
    h2: TlsConnector,
    h1: TlsConnector,
    timeout: Duration,
    max_frame_length: usize,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("address", &self.address)
            .field("server_name", &self.server_name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    /// `identity` is the client certificate chain and key; `None` dials
    /// anonymously, which a mutual-TLS endpoint will refuse.
    pub fn new(
        address: impl Into<String>,
        host: &str,
        anchors: Arc<RootCertStore>,
        identity: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
    ) -> Result<Self, ClientError> {
        let connector = |alpn: &[u8]| -> Result<TlsConnector, ClientError> {
            let identity = identity
                .as_ref()
                .map(|(chain, key)| (chain.clone(), key.clone_key()));
            let config: Arc<ClientConfig> =
                client_config(Arc::clone(&anchors), identity, vec![alpn.to_vec()])?;
            Ok(TlsConnector::from(config))
        };

        Ok(Self {
            address: address.into(),
            server_name: server_name(host)?,
            native: connector(ApplicationProtocol::NATIVE_RPC_ALPN)?,
            h2: connector(ApplicationProtocol::HTTP2_ALPN)?,
            h1: connector(ApplicationProtocol::HTTP11_ALPN)?,
            timeout: DEFAULT_TIMEOUT,
            max_frame_length: DEFAULT_MAX_FRAME,
        })
    }

    /// Load the client identity and CA bundle from PEM files.
    pub fn from_files(
        address: impl Into<String>,
        host: &str,
        identity: Option<(&Path, &Path)>,
        ca: &Path,
    ) -> Result<Self, ClientError> {
        match identity {
            Some((cert, key)) => {
                let material = TrustMaterial::load(cert, key, ca)?;
                Self::new(address, host, material.trust_anchors(), Some(material.client_identity()))
            }
            None => Self::new(address, host, load_trust_anchors(ca)?, None),
        }
    }

    /// Bound on each whole call, sent to the server as the call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn dial(&self, connector: &TlsConnector, alpn: &[u8]) -> Result<TlsStream<TcpStream>, ClientError> {
        let tcp = TcpStream::connect(&self.address)
            .await
            .map_err(|source| ClientError::Connect {
                address: self.address.clone(),
                source,
            })?;
        tcp.set_nodelay(true)?;
        let stream = connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(ClientError::Handshake)?;
        if stream.get_ref().1.alpn_protocol() != Some(alpn) {
            return Err(ClientError::Alpn(String::from_utf8_lossy(alpn).into_owned()));
        }
        Ok(stream)
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T, ClientError>>) -> Result<T, ClientError> {
        bounded(self.timeout, call).await
    }

    /// One call over the native `twinport-rpc/1` framing.
    pub async fn call_native(&self, method: &str, payload: Bytes) -> Result<Bytes, ClientError> {
        self.bounded(async {
            let stream = self.dial(&self.native, ApplicationProtocol::NATIVE_RPC_ALPN).await?;
            let mut framed = Framed::new(stream, frame_codec(self.max_frame_length));

            let request = NativeRequest {
                correlation_id: CorrelationId::new().to_string(),
                method: method.to_string(),
                payload,
                timeout_ms: self.timeout.as_millis() as u64,
                metadata: Default::default(),
            };
            framed.send(Bytes::from(request.encode_to_vec())).await?;

            let frame = framed
                .next()
                .await
                .ok_or_else(|| ClientError::Protocol("connection closed before reply".into()))??;
            let response = NativeResponse::decode(frame.freeze())?;
            if response.correlation_id != request.correlation_id {
                return Err(ClientError::Protocol(format!(
                    "reply for {} answered call {}",
                    response.correlation_id, request.correlation_id
                )));
            }
            response
                .into_result()
                .map_err(|e| ClientError::Status(tonic::Status::from(e)))
        })
        .await
    }

    /// Open an HTTP/1.1 connection for sequential REST calls.
    pub async fn connect_http1(&self) -> Result<RestConnection, ClientError> {
        self.bounded(self.open_http1()).await
    }

    /// Open an HTTP/2 connection; gRPC and REST calls on it run as
    /// concurrent streams.
    pub async fn connect_http2(&self) -> Result<Http2Connection, ClientError> {
        self.bounded(self.open_http2()).await
    }

    async fn open_http1(&self) -> Result<RestConnection, ClientError> {
        let stream = self.dial(&self.h1, ApplicationProtocol::HTTP11_ALPN).await?;
        let (sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "REST connection closed with error");
            }
        });
        Ok(RestConnection {
            sender,
            authority: self.authority(),
        })
    }

    async fn open_http2(&self) -> Result<Http2Connection, ClientError> {
        let stream = self.dial(&self.h2, ApplicationProtocol::HTTP2_ALPN).await?;
        let (sender, connection) =
            hyper::client::conn::http2::handshake(TokioExecutor::new(), TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "HTTP/2 connection closed with error");
            }
        });
        let origin: Uri = format!("https://{}", self.authority())
            .parse()
            .map_err(|e: http::uri::InvalidUri| ClientError::Protocol(e.to_string()))?;
        Ok(Http2Connection {
            sender,
            origin,
            timeout: self.timeout,
            max_frame_length: self.max_frame_length,
        })
    }

    /// One unary gRPC call over a fresh HTTP/2 connection.
    pub async fn grpc_unary(&self, method: &str, payload: Bytes) -> Result<Bytes, ClientError> {
        self.bounded(async { self.open_http2().await?.grpc_unary(method, payload).await })
            .await
    }

    /// One REST call over a fresh HTTP/1.1 connection. Error statuses are
    /// returned, not raised.
    pub async fn rest(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<RestResponse, ClientError> {
        self.bounded(async { self.open_http1().await?.send(method, path, body).await })
            .await
    }

    /// `proto.Ping/SayHello` through the chosen front-end.
    pub async fn say_hello(&self, transport: Transport, greeting: &str) -> Result<String, ClientError> {
        let request = PingMessage::new(greeting);
        let reply = match transport {
            Transport::Native => {
                let bytes = self.call_native(SAY_HELLO, Bytes::from(request.encode_to_vec())).await?;
                PingMessage::decode(bytes)?
            }
            Transport::Grpc => {
                let bytes = self.grpc_unary(SAY_HELLO, Bytes::from(request.encode_to_vec())).await?;
                PingMessage::decode(bytes)?
            }
            Transport::Rest => self
                .rest(Method::POST, "/v1/ping", Some(&serde_json::to_value(&request)?))
                .await?
                .error_for_status()?
                .json::<PingMessage>()?,
        };
        Ok(reply.greeting)
    }

    fn authority(&self) -> String {
        match &self.server_name {
            ServerName::DnsName(name) => {
                let port = self.address.rsplit_once(':').map(|(_, p)| p).unwrap_or("443");
                format!("{}:{port}", name.as_ref())
            }
            _ => self.address.clone(),
        }
    }
}

/// HTTP/1.1 connection; requests on it go one after another.
pub struct RestConnection {
    sender: hyper::client::conn::http1::SendRequest<Full<Bytes>>,
    authority: String,
}

impl std::fmt::Debug for RestConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestConnection")
            .field("authority", &self.authority)
            .finish_non_exhaustive()
    }
}

impl RestConnection {
    /// Send one REST request once the previous one has been answered.
    pub async fn send(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<RestResponse, ClientError> {
        self.sender.ready().await?;
        let builder = Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, self.authority.as_str());
        let request = rest_request(builder, body)?.map(Full::new);
        let response = self.sender.send_request(request).await?;
        read_rest_response(response).await
    }
}

/// HTTP/2 connection shared by concurrent gRPC and REST calls.
#[derive(Clone)]
pub struct Http2Connection {
    sender: hyper::client::conn::http2::SendRequest<Http2Body>,
    origin: Uri,
    timeout: Duration,
    max_frame_length: usize,
}

impl std::fmt::Debug for Http2Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Http2Connection")
            .field("origin", &self.origin)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Http2Connection {
    /// One unary gRPC call on its own stream.
    pub async fn grpc_unary(&self, method: &str, payload: Bytes) -> Result<Bytes, ClientError> {
        bounded(self.timeout, async {
            let path = PathAndQuery::try_from(format!("/{method}"))
                .map_err(|e| ClientError::Protocol(e.to_string()))?;
            let sender = self.sender.clone();
            let channel = tower::service_fn(move |request: Request<tonic::body::Body>| {
                let mut sender = sender.clone();
                let request = request.map(|body| {
                    body.map_err(|status| Box::new(status) as BoxError)
                        .boxed_unsync()
                });
                async move { sender.send_request(request).await }
            });

            let mut grpc = tonic::client::Grpc::with_origin(channel, self.origin.clone())
                .max_decoding_message_size(self.max_frame_length);
            grpc.ready().await?;

            let mut request = tonic::Request::new(payload);
            request.set_timeout(self.timeout);
            if let Ok(value) = CorrelationId::new().as_str().parse() {
                request.metadata_mut().insert(REQUEST_ID_HEADER, value);
            }

            let response = grpc.unary(request, path, BytesCodec).await?;
            Ok(response.into_inner())
        })
        .await
    }

    /// One REST call on its own stream. Error statuses are returned, not raised.
    pub async fn rest(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<RestResponse, ClientError> {
        bounded(self.timeout, async {
            let builder = Request::builder()
                .method(method)
                .uri(format!("{}{}", self.origin.to_string().trim_end_matches('/'), path));
            let request = rest_request(builder, body)?.map(|bytes| {
                Full::new(bytes)
                    .map_err(|never| match never {})
                    .boxed_unsync()
            });
            let response = self.sender.clone().send_request(request).await?;
            read_rest_response(response).await
        })
        .await
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type Http2Body = UnsyncBoxBody<Bytes, BoxError>;

async fn bounded<T>(timeout: Duration, call: impl Future<Output = Result<T, ClientError>>) -> Result<T, ClientError> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| ClientError::Timeout(timeout))?
}

fn rest_request(
    mut builder: http::request::Builder,
    body: Option<&serde_json::Value>,
) -> Result<Request<Bytes>, ClientError> {
    let body = match body {
        Some(json) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Bytes::from(serde_json::to_vec(json)?)
        }
        None => Bytes::new(),
    };
    builder
        .body(body)
        .map_err(|e| ClientError::Protocol(e.to_string()))
}

async fn read_rest_response(response: http::Response<Incoming>) -> Result<RestResponse, ClientError> {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await?.to_bytes();
    Ok(RestResponse { status, headers, body })
}
