use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use app_config::OrderLogPolicy;
use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use model::{Catalog, OrderLogEntry};
use order_log::{NoopOrderLog, OrderLogError, OrderLogSink};
use promotion::PromotionRule;
use serde_json::{Value, json};
use server::Server;
use service::{CheckoutSettings, MessageTemplate, StorefrontServiceImpl};
use tower::ServiceExt;

/// Fails the first `failures` calls, then succeeds.
struct FlakyLog {
    failures: AtomicUsize,
}

impl FlakyLog {
    fn failing(times: usize) -> Self {
        Self {
            failures: AtomicUsize::new(times),
        }
    }
}

#[async_trait]
impl OrderLogSink for FlakyLog {
    async fn record(&self, _entry: &OrderLogEntry) -> Result<(), OrderLogError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(OrderLogError::Timeout(Duration::from_secs(1)));
        }
        Ok(())
    }
}

fn router() -> Router {
    router_with(Arc::new(NoopOrderLog), OrderLogPolicy::BestEffort)
}

fn router_with(order_log: Arc<dyn OrderLogSink>, policy: OrderLogPolicy) -> Router {
    let service = StorefrontServiceImpl::new(
        Arc::new(Catalog::bundled().unwrap()),
        PromotionRule::new(
            "Wedhang Cafe JSR",
            3,
            vec!["Teko Rempah".to_string(), "Tumbler Rempah".to_string()],
        )
        .unwrap(),
        order_log,
        CheckoutSettings {
            template: MessageTemplate::new("Cafe JSR", "https://wa.me", "6281398898131"),
            order_log_timeout: Duration::from_secs(1),
            order_log_policy: policy,
        },
    );
    Server::new(0, Arc::new(service)).router()
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn fill_form(app: &Router) {
    for (field, value) in [
        ("name", "Sari"),
        ("phone", "081234567890"),
        ("address", "Jl. Kaliurang 12"),
        ("postalCode", "55281"),
    ] {
        let (status, _) = call(
            app,
            Method::PUT,
            "/api/customer",
            Some(json!({ "field": field, "value": value })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_catalog_grouped_by_category() {
    let app = router();
    let (status, body) = call(&app, Method::GET, "/api/catalog", None).await;
    assert_eq!(status, StatusCode::OK);
    let groups = body.as_array().unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0]["category"], "Snack Plizstop");
    assert_eq!(groups[1]["products"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_add_item_returns_notice_and_session() {
    let app = router();
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/cart/items",
        Some(json!({ "productId": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notice"], "Produk ditambahkan ke keranjang");
    assert_eq!(body["quantity"], 1);
    assert_eq!(body["session"]["totalFormatted"], "Rp15.000");
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let app = router();
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/cart/items",
        Some(json!({ "productId": 99 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_product");
}

#[tokio::test]
async fn test_update_and_remove_item() {
    let app = router();
    call(&app, Method::POST, "/api/cart/items", Some(json!({ "productId": 3 }))).await;

    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/cart/items/3",
        Some(json!({ "quantity": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalItems"], 3);
    assert_eq!(body["promotion"]["freeGifts"], 1);

    let (status, body) = call(&app, Method::DELETE, "/api/cart/items/3", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalItems"], 0);
    assert_eq!(body["promotion"]["freeGifts"], 0);
}

#[tokio::test]
async fn test_incomplete_form_is_unprocessable() {
    let app = router();
    call(&app, Method::POST, "/api/cart/items", Some(json!({ "productId": 1 }))).await;

    let (status, body) = call(&app, Method::POST, "/api/checkout", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "incomplete_customer_info");
    assert_eq!(body["message"], "Mohon lengkapi data pemesan terlebih dahulu.");
}

#[tokio::test]
async fn test_bonus_without_gift_is_rejected() {
    let app = router();
    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/bonus",
        Some(json!({ "bonus": "Teko Rempah" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "bonus_not_available");
}

#[tokio::test]
async fn test_missing_bonus_is_unprocessable() {
    let app = router();
    for _ in 0..3 {
        call(&app, Method::POST, "/api/cart/items", Some(json!({ "productId": 3 }))).await;
    }
    fill_form(&app).await;

    let (status, body) = call(&app, Method::POST, "/api/checkout", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "bonus_not_selected");
    assert_eq!(body["message"], "Mohon pilih bonus Anda terlebih dahulu.");
}

#[tokio::test]
async fn test_blocking_log_failure_is_unavailable_then_retryable() {
    let app = router_with(Arc::new(FlakyLog::failing(1)), OrderLogPolicy::Blocking);
    call(&app, Method::POST, "/api/cart/items", Some(json!({ "productId": 1 }))).await;
    fill_form(&app).await;

    let (status, body) = call(&app, Method::POST, "/api/checkout", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "order_log_failed");
    assert_eq!(
        body["message"],
        "Terjadi kesalahan saat memproses pesanan. Silakan coba lagi."
    );

    let (_, session) = call(&app, Method::GET, "/api/session", None).await;
    assert_eq!(session["checkout"]["state"], "failed");
    assert_eq!(session["totalItems"], 1);
    assert_eq!(session["canSubmit"], true);

    let (status, body) = call(&app, Method::POST, "/api/checkout", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "submitted");
    assert_eq!(body["order"]["totalFormatted"], "Rp15.000");
}

#[tokio::test]
async fn test_empty_cart_checkout_is_ignored() {
    let app = router();
    let (status, body) = call(&app, Method::POST, "/api/checkout", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "ignored");
    assert_eq!(body["reason"], "emptyCart");
}

#[tokio::test]
async fn test_checkout_confirm_flow() {
    let app = router();
    for _ in 0..3 {
        call(&app, Method::POST, "/api/cart/items", Some(json!({ "productId": 4 }))).await;
    }
    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/bonus",
        Some(json!({ "bonus": "Teko Rempah" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    fill_form(&app).await;

    let (status, body) = call(&app, Method::POST, "/api/checkout", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "submitted");
    assert_eq!(body["order"]["totalFormatted"], "Rp60.000");
    assert_eq!(body["order"]["promoDetails"], "1x Teko Rempah");
    assert_eq!(body["session"]["checkout"]["state"], "awaitingConfirmation");
    let uri = body["order"]["messagingUri"].as_str().unwrap().to_string();
    assert!(uri.starts_with("https://wa.me/6281398898131?text="));

    let (status, body) = call(&app, Method::POST, "/api/checkout/confirm", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messagingUri"], uri);
    assert_eq!(body["session"]["totalItems"], 0);
    assert_eq!(body["session"]["checkout"]["state"], "completed");
}

#[tokio::test]
async fn test_confirm_without_order_conflicts() {
    let app = router();
    let (status, body) = call(&app, Method::POST, "/api/checkout/confirm", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "nothing_to_confirm");
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = router();
    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    call(&app, Method::POST, "/api/checkout", None).await;

    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("http_requests_total"));
    assert!(text.contains("checkout_outcomes_total"));
}
