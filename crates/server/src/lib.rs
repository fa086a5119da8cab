//! Server crate provides the storefront HTTP API.
//!
//! This module exposes the catalog, the shopper's session (cart, delivery
//! form, gift choice) and the checkout steps as JSON endpoints, plus health
//! and Prometheus metrics.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{MatchedPath, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use model::CustomerField;
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use serde::{Deserialize, Serialize};
use serde_json::json;
use service::{CheckoutError, SessionSnapshot, StorefrontService, SubmitOutcome};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// Server represents the HTTP front of one storefront session.
pub struct Server<S: StorefrontService + 'static> {
    service: Arc<S>,
    port: u16,
    metrics: Arc<Metrics>,
}

/// Metrics collects and exposes HTTP server and checkout metrics.
struct Metrics {
    registry: Registry,
    http_requests_total: CounterVec,
    http_request_duration_seconds: HistogramVec,
    errors_total: CounterVec,
    checkout_outcomes_total: CounterVec,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status"],
        )
        .expect("Failed to create http_requests_total metric");

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "endpoint"],
        )
        .expect("Failed to create http_request_duration_seconds metric");

        let errors_total = CounterVec::new(
            Opts::new("errors_total", "Total number of errors"),
            &["source", "endpoint"],
        )
        .expect("Failed to create errors_total metric");

        let checkout_outcomes_total = CounterVec::new(
            Opts::new("checkout_outcomes_total", "Checkout attempts by outcome"),
            &["outcome"],
        )
        .expect("Failed to create checkout_outcomes_total metric");

        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("Failed to register http_requests_total metric");
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .expect("Failed to register http_request_duration_seconds metric");
        registry
            .register(Box::new(errors_total.clone()))
            .expect("Failed to register errors_total metric");
        registry
            .register(Box::new(checkout_outcomes_total.clone()))
            .expect("Failed to register checkout_outcomes_total metric");

        Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            errors_total,
            checkout_outcomes_total,
        }
    }

    fn record_request(&self, method: &str, endpoint: &str, status: u16, duration: Duration) {
        self.http_requests_total
            .with_label_values(&[method, endpoint, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, endpoint])
            .observe(duration.as_secs_f64());
    }

    fn record_error(&self, source: &str, endpoint: &str) {
        self.errors_total
            .with_label_values(&[source, endpoint])
            .inc();
    }

    fn record_checkout(&self, outcome: &str) {
        self.checkout_outcomes_total
            .with_label_values(&[outcome])
            .inc();
    }
}

/// Application state shared between request handlers
struct AppState<S> {
    service: Arc<S>,
    metrics: Arc<Metrics>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// JSON error body: a stable code, the shopper-facing text and the detail.
struct ApiError(CheckoutError);

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            CheckoutError::IncompleteCustomerInfo { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "incomplete_customer_info")
            }
            CheckoutError::BonusNotSelected => {
                (StatusCode::UNPROCESSABLE_ENTITY, "bonus_not_selected")
            }
            CheckoutError::BonusNotAvailable(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "bonus_not_available")
            }
            CheckoutError::UnknownProduct(_) => (StatusCode::NOT_FOUND, "unknown_product"),
            CheckoutError::NothingToConfirm => (StatusCode::CONFLICT, "nothing_to_confirm"),
            CheckoutError::OrderLog(_) => (StatusCode::SERVICE_UNAVAILABLE, "order_log_failed"),
        };
        warn!(error = %self.0, code, "Request rejected");
        let body = json!({
            "error": code,
            "message": self.0.user_message(),
            "detail": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddItemRequest {
    product_id: u32,
}

#[derive(Debug, Deserialize)]
struct UpdateQuantityRequest {
    quantity: i64,
}

#[derive(Debug, Deserialize)]
struct CustomerFieldRequest {
    field: CustomerField,
    value: String,
}

#[derive(Debug, Deserialize)]
struct BonusRequest {
    #[serde(default)]
    bonus: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemAddedResponse {
    notice: &'static str,
    product_id: u32,
    quantity: u32,
    session: SessionSnapshot,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmResponse {
    messaging_uri: String,
    session: SessionSnapshot,
}

impl<S: StorefrontService + 'static> Server<S> {
    /// Creates a new Server instance.
    ///
    /// # Arguments
    ///
    /// * `port` - The port on which the server will listen
    /// * `service` - The storefront service backing every endpoint
    pub fn new(port: u16, service: Arc<S>) -> Self {
        info!("Initializing HTTP server on port {}", port);

        Self {
            service,
            port,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Starts the server and runs until `shutdown` resolves.
    pub async fn start(&self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let app = self.router();

        let listener = TcpListener::bind(format!("0.0.0.0:{}", self.port))
            .await
            .context("Failed to bind to port")?;

        info!("HTTP server listening on port {}", self.port);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("Server error")?;

        info!("HTTP server shut down gracefully");
        Ok(())
    }

    pub fn router(&self) -> Router {
        let metrics = self.metrics.clone();

        Router::new()
            .route("/api/catalog", get(Self::handle_catalog))
            .route("/api/session", get(Self::handle_session))
            .route("/api/cart/items", post(Self::handle_add_item))
            .route(
                "/api/cart/items/{id}",
                put(Self::handle_update_quantity).delete(Self::handle_remove_item),
            )
            .route("/api/customer", put(Self::handle_customer_field))
            .route("/api/bonus", put(Self::handle_select_bonus))
            .route("/api/checkout", post(Self::handle_submit))
            .route("/api/checkout/confirm", post(Self::handle_confirm))
            .route("/api/checkout/dismiss", post(Self::handle_dismiss))
            .route("/health", get(Self::handle_health))
            .route("/metrics", get(Self::handle_metrics))
            .layer(axum::middleware::from_fn_with_state(
                metrics.clone(),
                Self::metrics_middleware,
            ))
            .with_state(AppState {
                service: self.service.clone(),
                metrics,
            })
    }

    /// Middleware for collecting metrics on HTTP requests
    async fn metrics_middleware(
        State(metrics): State<Arc<Metrics>>,
        req: axum::extract::Request,
        next: axum::middleware::Next,
    ) -> Response {
        let method = req.method().to_string();
        let path = req
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| req.uri().path().to_string());

        let start = std::time::Instant::now();
        let response = next.run(req).await;
        let duration = start.elapsed();

        let status = response.status().as_u16();
        metrics.record_request(&method, &path, status, duration);
        if status >= 400 {
            metrics.record_error("http", &path);
        }

        response
    }

    async fn handle_catalog(State(state): State<AppState<S>>) -> Response {
        Json(state.service.catalog().by_category()).into_response()
    }

    async fn handle_session(State(state): State<AppState<S>>) -> Json<SessionSnapshot> {
        Json(state.service.snapshot().await)
    }

    async fn handle_add_item(
        State(state): State<AppState<S>>,
        Json(req): Json<AddItemRequest>,
    ) -> Result<Json<ItemAddedResponse>, ApiError> {
        let added = state.service.add_to_cart(req.product_id).await?;
        Ok(Json(ItemAddedResponse {
            notice: added.notice,
            product_id: added.product_id,
            quantity: added.quantity,
            session: state.service.snapshot().await,
        }))
    }

    async fn handle_update_quantity(
        State(state): State<AppState<S>>,
        Path(product_id): Path<u32>,
        Json(req): Json<UpdateQuantityRequest>,
    ) -> Json<SessionSnapshot> {
        state.service.update_quantity(product_id, req.quantity).await;
        Json(state.service.snapshot().await)
    }

    async fn handle_remove_item(
        State(state): State<AppState<S>>,
        Path(product_id): Path<u32>,
    ) -> Json<SessionSnapshot> {
        state.service.remove_from_cart(product_id).await;
        Json(state.service.snapshot().await)
    }

    async fn handle_customer_field(
        State(state): State<AppState<S>>,
        Json(req): Json<CustomerFieldRequest>,
    ) -> Json<SessionSnapshot> {
        state.service.set_customer_field(req.field, req.value).await;
        Json(state.service.snapshot().await)
    }

    async fn handle_select_bonus(
        State(state): State<AppState<S>>,
        Json(req): Json<BonusRequest>,
    ) -> Result<Json<SessionSnapshot>, ApiError> {
        state.service.select_bonus(&req.bonus).await?;
        Ok(Json(state.service.snapshot().await))
    }

    async fn handle_submit(State(state): State<AppState<S>>) -> Result<Response, ApiError> {
        let outcome = match state.service.submit().await {
            Ok(outcome) => outcome,
            Err(e) => {
                let label = match &e {
                    CheckoutError::OrderLog(_) => "failed",
                    _ => "rejected",
                };
                state.metrics.record_checkout(label);
                return Err(e.into());
            }
        };
        let session = state.service.snapshot().await;

        let body = match outcome {
            SubmitOutcome::Ignored(reason) => {
                state.metrics.record_checkout("ignored");
                json!({ "outcome": "ignored", "reason": reason, "session": session })
            }
            SubmitOutcome::Submitted(order) => {
                let label = if order.warning.is_some() {
                    "submitted_with_warning"
                } else {
                    "submitted"
                };
                state.metrics.record_checkout(label);
                json!({ "outcome": "submitted", "order": order, "session": session })
            }
        };
        Ok((StatusCode::OK, Json(body)).into_response())
    }

    async fn handle_confirm(
        State(state): State<AppState<S>>,
    ) -> Result<Json<ConfirmResponse>, ApiError> {
        let messaging_uri = state.service.confirm_and_continue().await?;
        state.metrics.record_checkout("confirmed");
        Ok(Json(ConfirmResponse {
            messaging_uri,
            session: state.service.snapshot().await,
        }))
    }

    async fn handle_dismiss(
        State(state): State<AppState<S>>,
    ) -> Result<Json<SessionSnapshot>, ApiError> {
        state.service.close_without_confirming().await?;
        Ok(Json(state.service.snapshot().await))
    }

    async fn handle_health() -> &'static str {
        "OK"
    }

    async fn handle_metrics(State(state): State<AppState<S>>) -> Response {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&state.metrics.registry.gather(), &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
        }

        match String::from_utf8(buffer) {
            Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
            Err(e) => {
                error!("Failed to convert metrics to UTF-8: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Invalid metrics data").into_response()
            }
        }
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
