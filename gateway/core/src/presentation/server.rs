// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Gateway Server
//!
//! Assembles the gateway from a [`GatewayConfig`]: trust material, method
//! registry, route table, dispatcher, translator and listeners. `serve`
//! runs one task per accepted connection and returns once the shutdown
//! token fires and every connection task has finished.
//!
//! # Architecture
//!
//! - **Layer:** Presentation Layer
//! - **Purpose:** Accept loops, connection tasks and graceful shutdown

use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use super::demux::{serve_http, Demultiplexer};
use super::health::health_router;
use crate::application::dispatcher::Dispatcher;
use crate::application::ping_service;
use crate::application::translator::RestTranslator;
use crate::domain::config::{ConfigError, GatewayConfig};
use crate::domain::registry::{MethodRegistry, RegistryError};
use crate::domain::routes::{RouteError, RouteTable};
use crate::infrastructure::listener::{AuthenticatedStream, HandshakeError, ListenerError, MtlsListener};
use crate::infrastructure::tls::{server_config, TlsConfigError, TlsOptions};
use crate::infrastructure::trust_store::{TrustMaterial, TrustStoreError};

/// Pause after a failed `accept` (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    TrustStore(#[from] TrustStoreError),

    #[error(transparent)]
    Tls(#[from] TlsConfigError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Route(#[from] RouteError),
}

struct HealthListener {
    listener: MtlsListener,
    router: Router,
}

pub struct GatewayServer {
    listener: MtlsListener,
    demux: Demultiplexer,
    health: Option<HealthListener>,
    shutdown: CancellationToken,
}

impl GatewayServer {
    /// Load credentials from the configured paths and bind with the
    /// built-in `proto.Ping` service.
    pub async fn from_config(config: &GatewayConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let material = TrustMaterial::load(&config.tls.cert, &config.tls.key, &config.tls.ca)?;
        let registry = ping_service::register(MethodRegistry::builder())?.build();
        Self::bind(config, &material, registry).await
    }

    /// Bind every listener. The route table comes from `config.routes`, or
    /// from the `proto.Ping` bindings when none are configured.
    pub async fn bind(
        config: &GatewayConfig,
        material: &TrustMaterial,
        registry: MethodRegistry,
    ) -> Result<Self, ServerError> {
        let routes = if config.routes.is_empty() {
            RouteTable::new(&ping_service::routes())?
        } else {
            RouteTable::new(&config.routes)?
        };
        for route in routes.routes() {
            if !registry.contains(&route.rpc_method) {
                warn!(
                    method = %route.method,
                    pattern = %route.pattern,
                    rpc = %route.rpc_method,
                    "Route targets an unregistered RPC method"
                );
            }
        }

        let dispatcher = Arc::new(
            Dispatcher::new(Arc::new(registry)).with_max_timeout(config.request_timeout),
        );
        let translator = Arc::new(RestTranslator::new(
            Arc::new(routes),
            Arc::clone(&dispatcher),
            config.max_message_size,
        ));
        let demux = Demultiplexer::new(
            dispatcher,
            translator,
            &config.health.path,
            config.max_message_size,
        );

        let options = TlsOptions::from_settings(&config.tls);
        let listener =
            MtlsListener::bind(config.listen, server_config(material, &options)?, &options).await?;

        let health = match config.health.listen {
            Some(addr) => {
                let options = options.server_only();
                let listener =
                    MtlsListener::bind(addr, server_config(material, &options)?, &options).await?;
                Some(HealthListener {
                    listener,
                    router: health_router(&config.health.path),
                })
            }
            None => None,
        };

        Ok(Self {
            listener,
            demux,
            health,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn health_addr(&self) -> Option<SocketAddr> {
        self.health.as_ref().and_then(|h| h.listener.local_addr().ok())
    }

    /// Cancelling this token stops both accept loops and drains connections.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn serve(self) -> Result<(), ServerError> {
        let tracker = TaskTracker::new();
        info!(addr = %self.listener.local_addr()?, "Gateway serving");

        if let Some(HealthListener { listener, router }) = self.health {
            info!(addr = %listener.local_addr()?, "Health listener serving");
            let shutdown = self.shutdown.clone();
            let connections = tracker.clone();
            tracker.spawn(accept_loop(listener, shutdown, connections, move |stream| {
                let router = router.clone();
                async move {
                    let (io, context) = stream.into_parts();
                    let cancellation = context.cancellation().clone();
                    serve_http(io, cancellation, move |request| {
                        let router = router.clone();
                        async move {
                            match router.oneshot(request).await {
                                Ok(response) => response,
                                Err(never) => match never {},
                            }
                        }
                    })
                    .await
                }
            }));
        }

        let demux = self.demux;
        accept_loop(
            self.listener,
            self.shutdown.clone(),
            tracker.clone(),
            move |stream| {
                let demux = demux.clone();
                async move { demux.serve_connection(stream).await }
            },
        )
        .await;

        tracker.close();
        tracker.wait().await;
        info!("Gateway stopped");
        Ok(())
    }
}

/// Accept until `shutdown` fires, handshaking and serving each connection
/// on its own task.
async fn accept_loop<F, Fut>(
    listener: MtlsListener,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    serve: F,
) where
    F: Fn(AuthenticatedStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let serve = Arc::new(serve);
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let pending = match accepted {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        let shutdown = shutdown.clone();
        let serve = Arc::clone(&serve);
        tracker.spawn(async move {
            let peer = pending.peer_addr();
            match pending.handshake(&shutdown).await {
                Ok(stream) => serve(stream).await,
                Err(HandshakeError::Cancelled { .. }) => {
                    debug!(%peer, "Handshake abandoned for shutdown")
                }
                Err(e) => warn!(error = %e, "Rejected connection"),
            }
        });
    }
}
