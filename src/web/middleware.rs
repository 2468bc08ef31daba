use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use std::time::Instant;
use tracing::info;

use crate::web::AppState;

const REVALIDATE: &str = "no-cache, max-age=0, must-revalidate";

/// Request logging middleware
pub async fn request_logging(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(method = %method, uri = %uri, status = %status, duration_ms = %duration.as_millis(), "Request completed");
    } else if status.is_client_error() {
        tracing::warn!(method = %method, uri = %uri, status = %status, duration_ms = %duration.as_millis(), "Request completed");
    } else {
        info!(method = %method, uri = %uri, status = %status, duration_ms = %duration.as_millis(), "Request completed");
    }

    response
}

/// Caching headers for product reads.
///
/// The price history path expires at the next daily refresh. Other product
/// routes are revalidated against the product cache fingerprint, and a
/// matching `If-None-Match` on a read short-circuits with 304. Routes not
/// served from the product cache pass through untouched.
pub async fn cache_headers(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !is_product_path(request.uri().path()) {
        return next.run(request).await;
    }

    if is_prices_path(request.uri().path()) {
        let mut response = next.run(request).await;
        if response.status().is_success() {
            let seconds = seconds_until_next_refresh(
                Utc::now(),
                state.config.locale.offset(),
                state.config.locale.price_refresh_hour,
            );
            if let Ok(value) = HeaderValue::from_str(&format!("max-age={}", seconds)) {
                response.headers_mut().insert(header::CACHE_CONTROL, value);
            }
        }
        return response;
    }

    let is_read = matches!(*request.method(), Method::GET | Method::HEAD);
    if is_read {
        let current = etag(&state.cache.fingerprint().await);
        if if_none_match(request.headers(), &current) {
            tracing::debug!(uri = %request.uri(), "Not modified");
            return (
                StatusCode::NOT_MODIFIED,
                [(header::ETAG, current.clone()), (header::CACHE_CONTROL, REVALIDATE.to_string())],
            )
                .into_response();
        }
    }

    let mut response = next.run(request).await;
    let status = response.status();
    if status != StatusCode::BAD_REQUEST && status != StatusCode::NOT_FOUND {
        // Read after the handler: it may have filled the cache.
        let current = etag(&state.cache.fingerprint().await);
        let headers = response.headers_mut();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(REVALIDATE));
        if let Ok(value) = HeaderValue::from_str(&current) {
            headers.insert(header::ETAG, value);
        }
    }

    response
}

/// Routes whose bodies come from the product cache.
pub fn is_product_path(path: &str) -> bool {
    path == "/api/v1/products" || path.starts_with("/api/v1/products/")
}

pub fn is_prices_path(path: &str) -> bool {
    path.starts_with("/api/v1/products/") && path.ends_with("/prices")
}

/// Quoted entity tag for a cache fingerprint, separators removed.
pub fn etag(fingerprint: &str) -> String {
    format!("\"{}\"", fingerprint.replace('-', ""))
}

fn if_none_match(headers: &HeaderMap, current: &str) -> bool {
    let Some(value) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };

    let current = current.trim_matches('"');
    value.split(',').map(str::trim).any(|candidate| {
        let candidate = candidate.trim_start_matches("W/").trim_matches('"');
        candidate == "*" || candidate == current
    })
}

/// Seconds from `now` until the next `hour`:00 at the storefront's offset.
pub fn seconds_until_next_refresh(now: DateTime<Utc>, offset: FixedOffset, hour: u32) -> i64 {
    let local = now.with_timezone(&offset).naive_local();
    let Some(today) = local.date().and_hms_opt(hour, 0, 0) else {
        return 0;
    };

    let next = if local < today {
        today
    } else {
        today + Duration::days(1)
    };
    (next - local).num_seconds()
}
