// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0

//! REST surface: the liveness route plus a fallback that hands every other
//! request to the [`RestTranslator`]. The demultiplexer attaches the
//! connection's [`ConnectionContext`] as a request extension before calling
//! this router.

use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::health::liveness;
use crate::application::translator::{GatewayError, RestTranslator};
use crate::domain::context::ConnectionContext;
use crate::domain::error::RpcError;

pub fn router(translator: Arc<RestTranslator>, health_path: &str) -> Router {
    Router::new()
        .route(health_path, get(liveness))
        .fallback(translate)
        .with_state(translator)
        .layer(TraceLayer::new_for_http())
}

async fn translate(State(translator): State<Arc<RestTranslator>>, request: Request) -> Response {
    let Some(context) = request.extensions().get::<Arc<ConnectionContext>>().cloned() else {
        return GatewayError::Rpc(RpcError::internal("request reached the gateway without a connection"))
            .into_response();
    };
    translator.translate(request, &context).await
}
