// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Liveness endpoint.
//!
//! Answers a constant body without touching the translator or dispatcher.
//! On the main listener it is subject to the listener's client-auth policy;
//! `health_router` backs the optional server-auth-only health listener.

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

pub const LIVENESS_BODY: &str = "imok";

pub async fn liveness() -> &'static str {
    LIVENESS_BODY
}

/// Router that serves only the liveness path; everything else is 404.
pub fn health_router(path: &str) -> Router {
    Router::new()
        .route(path, get(liveness))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_liveness_body() {
        let response = health_router("/ruok")
            .oneshot(Request::get("/ruok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"imok");
    }

    #[tokio::test]
    async fn test_other_paths_are_not_served() {
        let response = health_router("/ruok")
            .oneshot(Request::post("/v1/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
