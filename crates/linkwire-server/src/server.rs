//! `LinkwireServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use linkwire_store::{ConnectionStore, NotificationStore};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::delivery::LiveDelivery;
use crate::directory::ProfileDirectory;
use crate::fanout::EventFanout;
use crate::health::{self, HealthResponse};
use crate::presence::PresenceRegistry;
use crate::reconcile::ReconciliationEndpoint;
use crate::service::ConnectionService;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::handler::ws_upgrade;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Runtime configuration.
    pub config: Arc<ServerConfig>,
    /// Connection actions.
    pub service: Arc<ConnectionService>,
    /// Read-side lookups.
    pub reconcile: Arc<ReconciliationEndpoint>,
    /// Profile lookups.
    pub directory: Arc<dyn ProfileDirectory>,
    /// The inbox.
    pub notifications: Arc<dyn NotificationStore>,
    /// Live channels by user.
    pub presence: Arc<PresenceRegistry>,
    /// Persist-then-push of connection events.
    pub fanout: Arc<EventFanout>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// One permit per open socket, registered or not.
    pub session_slots: Arc<Semaphore>,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
    /// When the server started.
    pub start_time: Instant,
}

/// The linkwire server.
pub struct LinkwireServer {
    state: AppState,
}

impl LinkwireServer {
    /// Wire the server over `store`, which backs both connection records and
    /// the notification inbox.
    pub fn new<S>(
        config: ServerConfig,
        store: Arc<S>,
        directory: Arc<dyn ProfileDirectory>,
        metrics: PrometheusHandle,
    ) -> Self
    where
        S: ConnectionStore + NotificationStore + 'static,
    {
        let connections: Arc<dyn ConnectionStore> = store.clone();
        let notifications: Arc<dyn NotificationStore> = store;
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let presence = Arc::new(PresenceRegistry::new());
        let delivery: Arc<dyn LiveDelivery> = presence.clone();
        let fanout = Arc::new(EventFanout::new(
            Arc::clone(&notifications),
            delivery,
            config.push_timeout(),
        ));
        let service = Arc::new(ConnectionService::new(
            Arc::clone(&connections),
            Arc::clone(&directory),
            Arc::clone(&fanout),
            config.max_attempts,
            shutdown.tracker(),
        ));
        let session_slots = Arc::new(Semaphore::new(
            config.max_connections.min(Semaphore::MAX_PERMITS),
        ));

        Self {
            state: AppState {
                config: Arc::new(config),
                service,
                reconcile: Arc::new(ReconciliationEndpoint::new(connections)),
                directory,
                notifications,
                presence,
                fanout,
                shutdown,
                session_slots,
                metrics,
                start_time: Instant::now(),
            },
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_upgrade))
            .merge(crate::http::routes())
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind, start the presence sweeper, and serve until shutdown.
    ///
    /// Returns the bound address and a handle that completes once the
    /// listener and the sweeper have stopped and open sessions and pending
    /// pushes have drained (or the shutdown timeout ran out).
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let config = &self.state.config;
        let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
        let addr = listener.local_addr()?;

        let sweeper = self.state.presence.spawn_sweeper(
            config.sweep_interval(),
            config.heartbeat_timeout(),
            config.max_push_failures,
            self.state.shutdown.child_token(),
        );

        let app = self.router();
        let shutdown = Arc::clone(&self.state.shutdown);
        let grace = config.shutdown_timeout();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled())
                .await;
            if let Err(e) = served {
                error!(error = %e, "server error");
            }
            let _ = sweeper.await;
            let _ = shutdown.drain(grace).await;
            info!("server stopped");
        });

        info!(%addr, "linkwire server listening");
        Ok((addr, handle))
    }

    /// Shared handler state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get the presence registry.
    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.state.presence
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Get the connection service.
    pub fn service(&self) -> &Arc<ConnectionService> {
        &self.state.service
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.presence.connection_count(),
        state.presence.user_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
