use std::sync::Arc;

use rust_decimal::Decimal;
use shelf_watcher::portal::ProductSource;
use shelf_watcher::storage::{MemoryStore, SessionStore};
use shelf_watcher::utils::error::AppError;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

const CODE: &str = "0789100010010";
const STALE_BODY: &str = "<html><body>Your session has expired</body></html>";

#[tokio::test]
async fn test_lookup_with_live_session() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_login(&server, 0).await;

    Mock::given(method("POST"))
        .and(path("/wwv_flow.ajax"))
        .and(body_string_contains("P1_CODE"))
        .and(body_string_contains(CODE))
        .and(body_string_contains("p_arg_values=42"))
        .respond_with(ResponseTemplate::new(200).set_body_string(lookup_body(CODE, "18,99")))
        .expect(1)
        .mount(&server)
        .await;

    let config = get_test_config(&server.uri());
    let fetcher = fetcher(&config, Arc::new(MemoryStore::new()))?;

    let snapshot = fetcher.fetch_by_code(CODE).await?.expect("product found");

    assert_eq!(snapshot.code, CODE);
    assert_eq!(snapshot.sequence_code, 12);
    assert_eq!(snapshot.current_price, Decimal::new(1899, 2));
    Ok(())
}

#[tokio::test]
async fn test_unknown_code_is_absent_without_login() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_login(&server, 0).await;

    Mock::given(method("POST"))
        .and(path("/wwv_flow.ajax"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"items":[]}"#))
        .expect(1)
        .mount(&server)
        .await;

    let config = get_test_config(&server.uri());
    let fetcher = fetcher(&config, Arc::new(MemoryStore::new()))?;

    assert!(fetcher.fetch_by_code(CODE).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_stale_session_is_refreshed_once() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/wwv_flow.ajax"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STALE_BODY))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/wwv_flow.ajax"))
        .and(body_string_contains(format!("PLUGIN%3D{}", AJAX_TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_string(lookup_body(CODE, "19.49")))
        .expect(1)
        .mount(&server)
        .await;

    let config = get_test_config(&server.uri());
    let store = Arc::new(MemoryStore::new());
    let fetcher = fetcher(&config, store.clone())?;

    let snapshot = fetcher.fetch_by_code(CODE).await?.expect("product found");

    assert_eq!(snapshot.current_price, Decimal::new(1949, 2));
    assert_eq!(store.session_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_still_undecodable_after_refresh_is_absent() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/wwv_flow.ajax"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STALE_BODY))
        .expect(2)
        .mount(&server)
        .await;

    let config = get_test_config(&server.uri());
    let fetcher = fetcher(&config, Arc::new(MemoryStore::new()))?;

    assert!(fetcher.fetch_by_code(CODE).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_failed_login_propagates() -> anyhow::Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/wwv_flow.ajax"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STALE_BODY))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/f"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .expect(1)
        .mount(&server)
        .await;

    let config = get_test_config(&server.uri());
    let store = Arc::new(MemoryStore::new());
    let fetcher = fetcher(&config, store.clone())?;

    let result = fetcher.fetch_by_code(CODE).await;

    assert!(matches!(result, Err(AppError::SessionAcquisition(_))));
    assert!(store.latest().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_server_error_is_a_transport_failure() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_login(&server, 0).await;

    Mock::given(method("POST"))
        .and(path("/wwv_flow.ajax"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let config = get_test_config(&server.uri());
    let fetcher = fetcher(&config, Arc::new(MemoryStore::new()))?;

    let result = fetcher.fetch_by_code(CODE).await;

    let err = match result {
        Err(err) => err,
        Ok(_) => panic!("expected an upstream status error"),
    };
    assert!(matches!(err, AppError::UpstreamStatus { status: 500, .. }));
    assert!(err.is_transport());
    Ok(())
}

#[tokio::test]
async fn test_unreadable_price_refreshes_session() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/wwv_flow.ajax"))
        .respond_with(ResponseTemplate::new(200).set_body_string(lookup_body(CODE, "n/a")))
        .expect(2)
        .mount(&server)
        .await;

    let config = get_test_config(&server.uri());
    let fetcher = fetcher(&config, Arc::new(MemoryStore::new()))?;

    assert!(fetcher.fetch_by_code(CODE).await?.is_none());
    Ok(())
}
