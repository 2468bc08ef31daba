// Integration test modules
pub mod api_tests;
pub mod fetch_tests;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use shelf_watcher::config::{
    AppConfig, DatabaseConfig, LocaleConfig, LoggingConfig, MetricsConfig, NotificationsConfig,
    PortalConfig, PortalCredentials, SchedulerConfig, ServerConfig, SmtpConfig,
};
use shelf_watcher::notifiers::LogNotifier;
use shelf_watcher::portal::{PortalClient, ProductFetcher, ProductSource, SessionManager};
use shelf_watcher::storage::{ProductRepository, SessionStore};
use shelf_watcher::web::AppState;
use shelf_watcher::{product_cache, JobRunner, JobState, ReconciliationJob};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const INSTANCE_ID: &str = "16077352119834";
pub const AJAX_TOKEN: &str = "PLUGINa1b2c3";
pub const COOKIE_NAME: &str = "ORA_WWV_APP_120";

/// Login page carrying every hidden field the form needs.
pub fn login_page() -> String {
    format!(
        r#"<html><body>
          <form action="wwv_flow.accept" method="post">
            <input type="hidden" name="p_flow_id" value="120" id="pFlowId" />
            <input type="hidden" name="p_instance" value="{}" id="pInstance" />
            <input type="hidden" name="p_page_submission_id" value="998877" id="pPageSubmissionId" />
            <input type="hidden" id="pPageChecksum" value="CHK42" />
          </form>
        </body></html>"#,
        INSTANCE_ID
    )
}

pub fn login_page_without_checksum() -> String {
    login_page().replace(r#"<input type="hidden" id="pPageChecksum" value="CHK42" />"#, "")
}

pub fn landing_page() -> String {
    format!(
        r#"<html><script>apex.widget.lookup("P1_CODE",{{"ajaxIdentifier":"{}","pageItems":"P1_STORE"}});</script></html>"#,
        AJAX_TOKEN
    )
}

pub fn lookup_body(code: &str, price: &str) -> String {
    format!(
        r#"{{"items":[{{"description":"Cafe Torrado 500g","code":"{}","sequenceCode":12,"price":"{}"}}]}}"#,
        code, price
    )
}

pub fn get_test_config(portal_base: &str) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: 5,
        },
        portal: PortalConfig {
            base_url: portal_base.to_string(),
            flow_id: "120".to_string(),
            login_page: "101".to_string(),
            landing_page: "1".to_string(),
            store_id: "42".to_string(),
            cookie_domain: "127.0.0.1".to_string(),
            cookie_secure: false,
            cookie_ttl_days: 10,
            request_timeout: 5,
            user_agent: "ShelfWatcher/test".to_string(),
            credentials: PortalCredentials {
                username: "watcher".to_string(),
                password: "hunter2".to_string(),
            },
        },
        scheduler: SchedulerConfig {
            cron: "0 0 6 * * *".to_string(),
            item_delay_ms: 0,
            trigger_header: "X-Appengine-Cron".to_string(),
        },
        notifications: NotificationsConfig {
            smtp: SmtpConfig {
                host: None,
                port: 587,
                username: None,
                password: None,
                from_address: None,
                from_name: "Shelf Watcher".to_string(),
                recipient: None,
                use_tls: false,
            },
        },
        locale: LocaleConfig {
            utc_offset_minutes: -180,
            price_refresh_hour: 5,
        },
        metrics: MetricsConfig {
            enabled: false,
            port: 9001,
        },
        logging: LoggingConfig::default(),
    }
}

pub fn sqlite_config(file: &Path) -> DatabaseConfig {
    DatabaseConfig {
        url: format!("sqlite://{}", file.display()),
        max_connections: 2,
        min_connections: 1,
        acquire_timeout: 5,
    }
}

/// Client and session manager wired against the mock portal.
pub fn portal(
    config: &AppConfig,
    store: Arc<dyn SessionStore>,
) -> anyhow::Result<(Arc<PortalClient>, Arc<SessionManager>)> {
    let client = Arc::new(PortalClient::new(config.portal.clone())?);
    let sessions = Arc::new(SessionManager::new(
        Arc::clone(&client),
        store,
        config.portal.credentials.clone(),
        config.locale.offset(),
    ));
    Ok((client, sessions))
}

pub fn fetcher(config: &AppConfig, store: Arc<dyn SessionStore>) -> anyhow::Result<ProductFetcher> {
    let (client, sessions) = portal(config, store)?;
    Ok(ProductFetcher::new(client, sessions))
}

/// Mount the three login steps, each expected `times` times.
pub async fn mount_login(server: &MockServer, times: u64) {
    Mock::given(method("GET"))
        .and(path("/f"))
        .and(query_param("p", "120:101"))
        .respond_with(ResponseTemplate::new(200).set_body_string(login_page()))
        .expect(times)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/wwv_flow.accept"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("f?p=120:1:{}", INSTANCE_ID).as_str())
                .insert_header(
                    "Set-Cookie",
                    format!("{}=ORA_WWV-s3cr3t; path=/; HttpOnly", COOKIE_NAME).as_str(),
                ),
        )
        .expect(times)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/f"))
        .and(query_param("p", format!("120:1:{}", INSTANCE_ID).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string(landing_page()))
        .expect(times)
        .mount(server)
        .await;
}

/// Application state over the given repository and price source.
pub fn create_test_app_state(
    config: AppConfig,
    products: Arc<dyn ProductRepository>,
    source: Arc<dyn ProductSource>,
) -> AppState {
    let cache = Arc::new(product_cache());
    let job = ReconciliationJob::new(
        Arc::clone(&products),
        source,
        Arc::new(LogNotifier),
        config.scheduler.item_delay(),
    );

    AppState {
        products,
        runner: Arc::new(JobRunner::new(Arc::new(job), Arc::clone(&cache))),
        cache,
        config: Arc::new(config),
    }
}

/// Poll the runner until it leaves the running state.
pub async fn wait_for_idle(runner: &JobRunner, timeout: Duration) -> JobState {
    let start = std::time::Instant::now();
    loop {
        let state = runner.state().await;
        if !state.is_running() || start.elapsed() >= timeout {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
