use chrono::{Duration, Utc};
use reqwest::cookie::Jar;
use reqwest::header::SET_COOKIE;
use reqwest::{redirect, Client, Response};
use std::sync::Arc;
use url::Url;

use crate::config::{PortalConfig, PortalCredentials};
use crate::models::Session;
use crate::portal::extract::LoginForm;
use crate::portal::{
    ACCEPT_PATH, AJAX_PATH, CODE_ARG, LOGIN_REQUEST, LOOKUP_MODE, MODE_ARG, PASSWORD_FIELD,
    STORE_ARG, USERNAME_FIELD,
};
use crate::utils::error::{AppError, Result};

/// Thin HTTP layer over the portal's four endpoints. Holds the cookie store
/// the session cookie lives in; only the session manager writes to it.
pub struct PortalClient {
    http: Client,
    jar: Arc<Jar>,
    origin: Url,
    config: PortalConfig,
}

impl PortalClient {
    pub fn new(config: PortalConfig) -> Result<Self> {
        let origin = Url::parse(&config.base_url)
            .map_err(|e| AppError::Internal(format!("invalid portal URL: {}", e)))?;
        let jar = Arc::new(Jar::default());

        // Redirects are not followed: the login response's Set-Cookie would be
        // lost to the follow-up request.
        let http = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .redirect(redirect::Policy::none())
            .connect_timeout(config.timeout())
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            jar,
            origin,
            config,
        })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn page_url(&self, page: &str, instance: Option<&str>) -> String {
        let mut target = format!("{}:{}", self.config.flow_id, page);
        if let Some(instance) = instance {
            target.push(':');
            target.push_str(instance);
        }
        format!("{}?p={}", self.url("f"), target)
    }

    pub async fn login_page(&self) -> Result<String> {
        let url = self.page_url(&self.config.login_page, None);
        tracing::debug!(url = %url, "Fetching login page");
        let response = self.http.get(&url).send().await?;
        Ok(ensure_success(response, false).await?.text().await?)
    }

    /// Submit the login form. Returns the raw Set-Cookie headers of the response.
    pub async fn submit_login(
        &self,
        form: &LoginForm,
        credentials: &PortalCredentials,
    ) -> Result<Vec<String>> {
        let url = self.url(ACCEPT_PATH);
        tracing::debug!(url = %url, instance = %form.instance_id, "Submitting login form");

        let fields = [
            ("p_flow_id", self.config.flow_id.as_str()),
            ("p_flow_step_id", self.config.login_page.as_str()),
            ("p_instance", form.instance_id.as_str()),
            ("p_page_submission_id", form.submission_id.as_str()),
            ("p_request", LOGIN_REQUEST),
            ("p_reload_on_submit", "A"),
            (USERNAME_FIELD, credentials.username.as_str()),
            (PASSWORD_FIELD, credentials.password.as_str()),
            ("pPageChecksum", form.checksum.as_str()),
        ];

        let response = self.http.post(&url).form(&fields).send().await?;
        let response = ensure_success(response, true).await?;

        Ok(response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect())
    }

    pub async fn landing_page(&self, instance_id: &str) -> Result<String> {
        let url = self.page_url(&self.config.landing_page, Some(instance_id));
        tracing::debug!(url = %url, "Fetching landing page");
        let response = self.http.get(&url).send().await?;
        Ok(ensure_success(response, false).await?.text().await?)
    }

    /// Run the product lookup process for one code. The body is returned as-is;
    /// deciding whether it is usable is the caller's job.
    pub async fn lookup(&self, session: &Session, code: &str) -> Result<String> {
        let url = self.url(AJAX_PATH);
        let request = format!("PLUGIN={}", session.ajax_token);

        let fields = [
            ("p_flow_id", self.config.flow_id.as_str()),
            ("p_flow_step_id", self.config.landing_page.as_str()),
            ("p_instance", session.session_id.as_str()),
            ("p_request", request.as_str()),
            ("p_arg_names", STORE_ARG),
            ("p_arg_values", self.config.store_id.as_str()),
            ("p_arg_names", CODE_ARG),
            ("p_arg_values", code),
            ("p_arg_names", MODE_ARG),
            ("p_arg_values", LOOKUP_MODE),
        ];

        let response = self.http.post(&url).form(&fields).send().await?;
        Ok(ensure_success(response, false).await?.text().await?)
    }

    /// Put the session cookie in the store with our own lifetime, so it does not
    /// expire locally before the server drops it.
    pub fn add_session_cookie(&self, name: &str, value: &str) {
        let expires = Utc::now() + Duration::days(self.config.cookie_ttl_days);
        let mut cookie = format!(
            "{}={}; Path=/; Domain={}; Expires={}",
            name,
            value,
            self.config.cookie_domain,
            expires.format("%a, %d %b %Y %H:%M:%S GMT")
        );
        if self.config.cookie_secure {
            cookie.push_str("; Secure");
        }

        self.jar.add_cookie_str(&cookie, &self.origin);
        tracing::debug!(cookie = %name, domain = %self.config.cookie_domain, "Registered session cookie");
    }
}

async fn ensure_success(response: Response, allow_redirect: bool) -> Result<Response> {
    let status = response.status();
    if status.is_success() || (allow_redirect && status.is_redirection()) {
        return Ok(response);
    }

    Err(AppError::UpstreamStatus {
        status: status.as_u16(),
        url: response.url().to_string(),
    })
}
