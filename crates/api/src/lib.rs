//! HTTP API server with observability for the checkout core.
//!
//! Provides REST endpoints for product registration, checkout and order
//! reads, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::{InMemoryPaymentGateway, OrderCoordinator};
use common::Clock;
use domain::{InMemoryCatalog, InMemoryOrderRepository};
use inventory::{ExpirySweeper, InMemoryInventoryLedger, InMemoryReservationStore};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

pub type Reservations = InMemoryReservationStore<InMemoryInventoryLedger>;

pub type Coordinator = OrderCoordinator<
    Reservations,
    InMemoryCatalog,
    InMemoryOrderRepository,
    InMemoryPaymentGateway,
>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub coordinator: Coordinator,
    pub ledger: InMemoryInventoryLedger,
    pub reservations: Reservations,
    pub catalog: InMemoryCatalog,
    pub payment: InMemoryPaymentGateway,
    clock: Arc<dyn Clock>,
}

impl AppState {
    /// Builds the expiry sweeper for this state's reservations.
    pub fn sweeper(&self, config: &Config) -> ExpirySweeper<Reservations> {
        ExpirySweeper::new(
            self.reservations.clone(),
            self.clock.clone(),
            config.sweep_interval(),
        )
    }

    /// Returns the clock shared by the coordinator and the sweeper.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/products", post(routes::products::create))
        .route(
            "/products/{id}",
            get(routes::products::get)
                .put(routes::products::update)
                .delete(routes::products::deactivate),
        )
        .route("/checkout", post(routes::orders::checkout))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates in-memory application state driven by `clock`.
pub fn create_state(config: &Config, clock: Arc<dyn Clock>) -> Arc<AppState> {
    let ledger = InMemoryInventoryLedger::new();
    let reservations = InMemoryReservationStore::new(ledger.clone(), clock.clone());
    let catalog = InMemoryCatalog::new();
    let payment = InMemoryPaymentGateway::new();

    let coordinator = OrderCoordinator::new(
        reservations.clone(),
        catalog.clone(),
        InMemoryOrderRepository::new(),
        payment.clone(),
        clock.clone(),
        config.checkout(),
    );

    Arc::new(AppState {
        coordinator,
        ledger,
        reservations,
        catalog,
        payment,
        clock,
    })
}

/// Creates the default application state on the system clock.
pub fn create_default_state(config: &Config) -> Arc<AppState> {
    create_state(config, Arc::new(common::SystemClock))
}
