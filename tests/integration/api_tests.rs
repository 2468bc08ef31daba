use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use shelf_watcher::models::{NewProduct, Product, ProductWithAllPrices, ProductWithLatestPrice};
use shelf_watcher::storage::MemoryStore;
use shelf_watcher::web::{create_router, ApiResponse, AppState, TRIGGER_ACCEPTED};
use shelf_watcher::JobState;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

const CODE: &str = "0789100010010";
const TRIGGER: &str = "X-Appengine-Cron";

fn tracked_product() -> Product {
    let mut product = Product::new(NewProduct {
        description: "Cafe Torrado 500g".into(),
        code: CODE.into(),
        sequence_code: 12,
    });
    product.record_price(Decimal::new(1799, 2), Utc::now() - chrono::Duration::days(2));
    product.record_price(Decimal::new(1899, 2), Utc::now() - chrono::Duration::days(1));
    product
}

async fn test_app(server: &MockServer) -> anyhow::Result<(Router, AppState)> {
    let config = get_test_config(&server.uri());
    let store = Arc::new(MemoryStore::with_products(vec![tracked_product()]));
    let source = Arc::new(fetcher(&config, store.clone())?);
    let state = create_test_app_state(config, store, source);
    Ok((create_router(state.clone()), state))
}

async fn send(app: &Router, request: Request<Body>) -> anyhow::Result<Response> {
    Ok(app.clone().oneshot(request).await?)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn trigger(value: Option<&str>) -> Request<Body> {
    let mut request = Request::builder().method("POST").uri("/api/v1/jobs/reconcile");
    if let Some(value) = value {
        request = request.header(TRIGGER, value);
    }
    request.body(Body::empty()).unwrap()
}

async fn json<T: DeserializeOwned>(response: Response) -> anyhow::Result<T> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn text(response: Response) -> anyhow::Result<String> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

#[tokio::test]
async fn test_matching_etag_is_not_modified() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (app, _state) = test_app(&server).await?;

    let first = send(&app, get("/api/v1/products")).await?;
    assert_eq!(first.status(), StatusCode::OK);
    let etag = first.headers()[header::ETAG].to_str()?.to_string();
    assert!(etag.starts_with('"') && !etag.contains('-'));

    let second = send(
        &app,
        Request::builder()
            .uri("/api/v1/products")
            .header(header::IF_NONE_MATCH, etag.as_str())
            .body(Body::empty())?,
    )
    .await?;

    assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(second.headers()[header::ETAG].to_str()?, etag);
    assert_eq!(
        second.headers()[header::CACHE_CONTROL],
        "no-cache, max-age=0, must-revalidate"
    );
    Ok(())
}

#[tokio::test]
async fn test_stale_etag_gets_full_response() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (app, _state) = test_app(&server).await?;

    let response = send(
        &app,
        Request::builder()
            .uri("/api/v1/products")
            .header(header::IF_NONE_MATCH, "\"0000\"")
            .body(Body::empty())?,
    )
    .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: ApiResponse<Vec<serde_json::Value>> = json(response).await?;
    assert_eq!(body.data.map(|d| d.len()), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_product_shows_latest_price() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (app, _state) = test_app(&server).await?;

    let response = send(&app, get(&format!("/api/v1/products/{}", CODE))).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: ApiResponse<ProductWithLatestPrice> = json(response).await?;
    let product = body.data.expect("product payload");
    assert_eq!(product.code, CODE);
    assert_eq!(product.price.map(|p| p.value), Some(Decimal::new(1899, 2)));
    Ok(())
}

#[tokio::test]
async fn test_price_history_expires_at_next_refresh() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (app, _state) = test_app(&server).await?;

    let response = send(&app, get(&format!("/api/v1/products/{}/prices?limit=1", CODE))).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::ETAG).is_none());
    let max_age: i64 = response.headers()[header::CACHE_CONTROL]
        .to_str()?
        .trim_start_matches("max-age=")
        .parse()?;
    assert!(max_age > 0 && max_age <= 86_400);

    let body: ApiResponse<ProductWithAllPrices> = json(response).await?;
    let prices = body.data.expect("prices payload").prices;
    assert_eq!(prices.len(), 1);
    assert_eq!(prices[0].value, Decimal::new(1899, 2));
    Ok(())
}

#[tokio::test]
async fn test_unknown_product_is_plain_not_found() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (app, _state) = test_app(&server).await?;

    let response = send(&app, get("/api/v1/products/7890000000001")).await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get(header::ETAG).is_none());
    assert_eq!(text(response).await?, "Product 7890000000001 not found");
    Ok(())
}

#[tokio::test]
async fn test_malformed_code_lists_violations() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (app, _state) = test_app(&server).await?;

    let response = send(&app, get("/api/v1/products/12AB")).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::ETAG).is_none());
    let body: ApiResponse<()> = json(response).await?;
    assert!(!body.success);
    let details = body.error.and_then(|e| e.details).expect("violation details");
    assert!(details.to_string().contains("code"));
    Ok(())
}

#[tokio::test]
async fn test_trigger_without_header_is_rejected() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (app, state) = test_app(&server).await?;

    assert_eq!(send(&app, trigger(None)).await?.status(), StatusCode::BAD_REQUEST);
    assert_eq!(send(&app, trigger(Some("false"))).await?.status(), StatusCode::BAD_REQUEST);
    assert_eq!(state.runner.state().await, JobState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_trigger_conflicts_and_run_updates_prices() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wwv_flow.ajax"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(lookup_body(CODE, "19,49"))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (app, state) = test_app(&server).await?;

    // Fill the cache so the run's eviction changes the entity tag.
    let before = send(&app, get("/api/v1/products")).await?;
    let stale_etag = before.headers()[header::ETAG].to_str()?.to_string();

    let first = send(&app, trigger(Some("true"))).await?;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(text(first).await?, TRIGGER_ACCEPTED);

    let second = send(&app, trigger(Some("true"))).await?;
    assert_eq!(second.status(), StatusCode::CONFLICT);

    match wait_for_idle(&state.runner, Duration::from_secs(5)).await {
        JobState::Completed { summary, .. } => {
            assert_eq!(summary.total, 1);
            assert_eq!(summary.changed(), 1);
            assert_eq!(summary.persisted, 1);
        }
        other => panic!("expected a completed run, got {:?}", other),
    }

    let after = send(
        &app,
        Request::builder()
            .uri(&format!("/api/v1/products/{}", CODE))
            .header(header::IF_NONE_MATCH, stale_etag.as_str())
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(after.status(), StatusCode::OK);

    let body: ApiResponse<ProductWithLatestPrice> = json(after).await?;
    let price = body.data.and_then(|p| p.price).expect("latest price");
    assert_eq!(price.value, Decimal::new(1949, 2));
    Ok(())
}

#[tokio::test]
async fn test_status_reports_idle_before_any_run() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (app, _state) = test_app(&server).await?;

    let response = send(&app, get("/api/v1/jobs/reconcile")).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: ApiResponse<serde_json::Value> = json(response).await?;
    assert_eq!(body.data.expect("state payload")["state"], "idle");
    Ok(())
}
