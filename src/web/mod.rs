use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::cache::ProductCache;
use crate::config::AppConfig;
use crate::scheduler::JobRunner;
use crate::storage::ProductRepository;

pub mod handlers;
pub mod middleware;
pub mod responses;

pub use handlers::{
    get_product, get_product_prices, health_check, list_products, reconcile_status,
    trigger_reconcile, TRIGGER_ACCEPTED,
};
pub use responses::*;

#[derive(Clone)]
pub struct AppState {
    pub products: Arc<dyn ProductRepository>,
    pub cache: Arc<ProductCache>,
    pub runner: Arc<JobRunner>,
    pub config: Arc<AppConfig>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(from_fn_with_state(state.clone(), middleware::cache_headers))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(from_fn(middleware::request_logging))
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:code", get(get_product))
        .route("/products/:code/prices", get(get_product_prices))
        .route("/jobs/reconcile", get(reconcile_status).post(trigger_reconcile))
}

pub async fn serve(
    config: &AppConfig,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
            .await?;

    tracing::info!(
        "Server starting on {}:{}",
        config.server.host,
        config.server.port
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
