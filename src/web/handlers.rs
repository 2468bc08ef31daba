use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::Deserialize;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::{
    summary, with_all_prices, with_latest_price, Product, ProductSummary, ProductWithAllPrices,
    ProductWithLatestPrice,
};
use crate::scheduler::JobState;
use crate::utils::error::AppError;

use super::{ApiResponse, AppState, HealthResponse, Violation, WebError};

/// Body returned when an on-demand run was dispatched.
pub const TRIGGER_ACCEPTED: &str = "OK";

const ALL_PRODUCTS: &str = "products:all";

#[derive(Debug, Validate)]
pub struct ProductCode {
    #[validate(length(equal = 13, message = "must be exactly 13 digits"))]
    pub code: String,
}

impl ProductCode {
    pub fn parse(code: String) -> Result<Self, WebError> {
        let candidate = Self { code };
        let mut errors = match candidate.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };

        if !candidate.code.chars().all(|c| c.is_ascii_digit()) {
            let mut error = ValidationError::new("numeric");
            error.message = Some("must contain only digits".into());
            errors.add("code", error);
        }

        if errors.is_empty() {
            Ok(candidate)
        } else {
            Err(errors.into())
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct PricesQuery {
    #[validate(range(min = 1, max = 365, message = "must be between 1 and 365"))]
    pub limit: Option<u32>,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

async fn all_products(state: &AppState) -> Result<Vec<Product>, WebError> {
    if let Some(products) = state.cache.get(ALL_PRODUCTS).await {
        return Ok(products);
    }

    let products = state.products.find_all().await?;
    state.cache.put(ALL_PRODUCTS, products.clone()).await;
    Ok(products)
}

async fn product_by_code(state: &AppState, code: &ProductCode) -> Result<Product, WebError> {
    let key = format!("product:{}", code.code);
    if let Some(product) = state.cache.get(&key).await.and_then(|mut hits| hits.pop()) {
        return Ok(product);
    }

    let product = state
        .products
        .find_by_code(&code.code)
        .await?
        .ok_or_else(|| AppError::ItemNotFound {
            code: code.code.clone(),
        })?;
    state.cache.put(key, vec![product.clone()]).await;
    Ok(product)
}

pub async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ProductSummary>>>, WebError> {
    let products = all_products(&state).await?;
    tracing::debug!(count = products.len(), "Listing products");
    Ok(Json(ApiResponse::success(products.iter().map(summary).collect())))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<ProductWithLatestPrice>>, WebError> {
    let code = ProductCode::parse(code)?;
    let product = product_by_code(&state, &code).await?;
    Ok(Json(ApiResponse::success(with_latest_price(&product))))
}

pub async fn get_product_prices(
    State(state): State<AppState>,
    Path(code): Path<String>,
    query: Result<Query<PricesQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<ProductWithAllPrices>>, WebError> {
    let code = ProductCode::parse(code)?;
    let Query(query) = query
        .map_err(|e| WebError::Violations(vec![Violation::new("limit", e.body_text())]))?;
    query.validate()?;

    let product = product_by_code(&state, &code).await?;
    let limit = query.limit.map(|l| l as usize);
    Ok(Json(ApiResponse::success(with_all_prices(&product, limit))))
}

/// Values of the trigger header that do not assert a trusted caller.
fn is_false_like(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "false" | "0" | "no" | "off"
    )
}

pub async fn trigger_reconcile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, &'static str), WebError> {
    let header_name = state.config.scheduler.trigger_header.as_str();
    let asserted = headers
        .get(header_name)
        .map(|v| v.to_str().map(|s| !is_false_like(s)).unwrap_or(false));

    match asserted {
        None => {
            return Err(WebError::bad_request(format!("Missing {} header", header_name)));
        }
        Some(false) => {
            return Err(WebError::bad_request(format!("{} header is not set", header_name)));
        }
        Some(true) => {}
    }

    let _run = state.runner.try_start().await?;
    tracing::info!("On-demand reconciliation dispatched");
    Ok((StatusCode::OK, TRIGGER_ACCEPTED))
}

pub async fn reconcile_status(State(state): State<AppState>) -> Json<ApiResponse<JobState>> {
    Json(ApiResponse::success(state.runner.state().await))
}
