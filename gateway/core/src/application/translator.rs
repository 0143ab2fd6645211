// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! REST Gateway Translator
//!
//! Turns an HTTP/JSON request into an RPC envelope using the [`RouteTable`],
//! runs it through the in-process [`Dispatcher`], and serializes the result
//! back to JSON. Failures become an HTTP status plus a `{code, message}`
//! body, where `code` is the numeric gRPC status.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** REST-to-RPC transcoding in front of the shared dispatcher

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use http::{Request, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::dispatcher::Dispatcher;
use crate::domain::context::ConnectionContext;
use crate::domain::envelope::{CorrelationId, Payload, RpcEnvelope};
use crate::domain::error::{RpcCode, RpcError};
use crate::domain::registry::MethodHandler;
use crate::domain::routes::{BodyRule, RouteTable};
use crate::domain::timeout::{parse_grpc_timeout, GRPC_TIMEOUT_HEADER};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// REST headers with this prefix are forwarded as RPC metadata.
pub const METADATA_HEADER_PREFIX: &str = "grpc-metadata-";

const MAX_RETYPED_PARAMS: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// JSON body of every REST error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Rpc(err) => err.code.http_status(),
        }
    }

    pub fn body(&self) -> ErrorBody {
        let (code, message) = match self {
            Self::RouteNotFound { .. } => (RpcCode::NotFound, self.to_string()),
            Self::BadRequest(reason) => (RpcCode::InvalidArgument, reason.clone()),
            Self::Rpc(err) => (err.code, err.message.clone()),
        };
        ErrorBody {
            code: code.as_grpc() as i32,
            message,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[derive(Debug, Clone)]
pub struct RestTranslator {
    routes: Arc<RouteTable>,
    dispatcher: Arc<Dispatcher>,
    max_body_size: usize,
}

impl RestTranslator {
    pub fn new(routes: Arc<RouteTable>, dispatcher: Arc<Dispatcher>, max_body_size: usize) -> Self {
        Self {
            routes,
            dispatcher,
            max_body_size,
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Serve one REST request. Never fails: errors become responses.
    pub async fn translate(&self, request: Request<Body>, context: &ConnectionContext) -> Response {
        let correlation_id = CorrelationId::from_header(
            request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok()),
        );
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let mut response = match self.handle(request, context, correlation_id.clone()).await {
            Ok(response) => response,
            Err(err) => {
                let status = err.status();
                if status.is_server_error() {
                    warn!(%method, %path, %status, error = %err, "REST request failed");
                } else {
                    debug!(%method, %path, %status, error = %err, "REST request rejected");
                }
                err.into_response()
            }
        };

        if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }

    async fn handle(
        &self,
        request: Request<Body>,
        context: &ConnectionContext,
        correlation_id: CorrelationId,
    ) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();
        let matched = self
            .routes
            .resolve(&parts.method, parts.uri.path())
            .ok_or_else(|| GatewayError::RouteNotFound {
                method: parts.method.to_string(),
                path: parts.uri.path().to_string(),
            })?;
        let route = matched.route;

        let requested = parts
            .headers
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_grpc_timeout)
            .map(|timeout| Instant::now() + timeout);
        let deadline = self.dispatcher.effective_deadline(requested);

        let read = axum::body::to_bytes(body, self.max_body_size);
        let body = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, read).await.map_err(|_| {
                RpcError::deadline_exceeded("deadline expired while reading the request body")
            })?,
            None => read.await,
        }
        .map_err(|e| GatewayError::BadRequest(format!("failed to read request body: {e}")))?;
        if !body.is_empty() && !has_json_content_type(&parts.headers) {
            return Err(GatewayError::BadRequest(
                "request body must be application/json".to_string(),
            ));
        }

        let message = build_message(&route.body, &body, &matched.params, parts.uri.query())?;
        let mut payload = Payload::Json(Value::Object(message));
        if let Some(handler) = self.dispatcher.registry().get(&route.rpc_method) {
            if let Err(err) = handler.check(&payload) {
                payload = retype_path_params(handler.as_ref(), &payload, &matched.params)
                    .ok_or(GatewayError::BadRequest(err.message))?;
            }
        }

        let mut envelope =
            RpcEnvelope::new(route.rpc_method.clone(), payload).with_correlation_id(correlation_id);
        envelope.metadata.extend(forwarded_metadata(&parts.headers));

        let reply = self.dispatcher.dispatch(envelope, context, deadline).await?;
        let json = reply
            .payload
            .into_json()
            .ok_or_else(|| RpcError::internal("handler answered with a binary payload"))?;

        Ok((StatusCode::OK, Json(json)).into_response())
    }
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    match headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        None => true,
        Some(value) => {
            let mime = value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        }
    }
}

fn parse_body(body: &[u8]) -> Result<Option<Value>, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| GatewayError::BadRequest(format!("malformed JSON body: {e}")))
}

/// Assemble the JSON request message from body, query and path bindings.
///
/// Path parameters win over body and query values of the same name, and a
/// body field is never merged with a query value. Query parameters are bound
/// only when the body is not the whole message. Every binding is a JSON
/// string at this stage; see [`retype_path_params`].
fn build_message(
    rule: &BodyRule,
    body: &[u8],
    params: &[(String, String)],
    query: Option<&str>,
) -> Result<Map<String, Value>, GatewayError> {
    let mut message = match rule {
        BodyRule::Whole => match parse_body(body)? {
            None => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(GatewayError::BadRequest(
                    "request body must be a JSON object".to_string(),
                ))
            }
        },
        BodyRule::Field(field) => {
            let mut map = Map::new();
            if let Some(value) = parse_body(body)? {
                map.insert(field.clone(), value);
            }
            map
        }
        BodyRule::None => Map::new(),
    };

    if *rule != BodyRule::Whole {
        for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            let bound_by_body = matches!(rule, BodyRule::Field(field) if *field == key);
            if bound_by_body || params.iter().any(|(name, _)| *name == key) {
                continue;
            }
            let value = Value::String(value.into_owned());
            match message.get_mut(key.as_ref()) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    message.insert(key.into_owned(), value);
                }
            }
        }
    }

    for (name, value) in params {
        message.insert(name.clone(), Value::String(value.clone()));
    }
    Ok(message)
}

/// Path segments arrive as text. Find a binding of the segments that read
/// as integers, floats or booleans to JSON scalars that the handler's
/// request type accepts, trying every combination of typed segments.
fn retype_path_params(
    handler: &dyn MethodHandler,
    payload: &Payload,
    params: &[(String, String)],
) -> Option<Payload> {
    let Payload::Json(Value::Object(message)) = payload else {
        return None;
    };
    let typable: Vec<(&String, Value)> = params
        .iter()
        .filter_map(|(name, value)| json_scalar(value).map(|typed| (name, typed)))
        .collect();
    if typable.is_empty() || typable.len() > MAX_RETYPED_PARAMS {
        return None;
    }

    (1u32..1 << typable.len()).find_map(|mask| {
        let mut candidate = message.clone();
        for (i, (name, typed)) in typable.iter().enumerate() {
            if mask & (1 << i) != 0 {
                candidate.insert((*name).clone(), typed.clone());
            }
        }
        let candidate = Payload::Json(Value::Object(candidate));
        handler.check(&candidate).is_ok().then_some(candidate)
    })
}

fn json_scalar(text: &str) -> Option<Value> {
    if let Ok(b) = text.parse::<bool>() {
        return Some(Value::Bool(b));
    }
    if let Ok(n) = text.parse::<i64>() {
        return Some(Value::from(n));
    }
    if let Ok(n) = text.parse::<u64>() {
        return Some(Value::from(n));
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

fn forwarded_metadata(headers: &HeaderMap) -> impl Iterator<Item = (String, String)> + '_ {
    headers.iter().filter_map(|(name, value): (&HeaderName, &HeaderValue)| {
        let key = name.as_str().strip_prefix(METADATA_HEADER_PREFIX)?;
        let value = value.to_str().ok()?;
        Some((key.to_string(), value.to_string()))
    })
}
