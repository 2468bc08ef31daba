use chrono::{FixedOffset, NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::PortalCredentials;
use crate::models::{NewSessionRecord, Session};
use crate::portal::client::PortalClient;
use crate::portal::extract::{extract_ajax_token, parse_session_cookie, LoginForm};
use crate::storage::SessionStore;
use crate::utils::error::Result;

/// Owns the portal session: the in-memory copy, the cookie in the client's
/// store, and the daily record in the session store.
///
/// Reading and refreshing go through one lock, so a fetch never sees a
/// session that is halfway through being replaced.
pub struct SessionManager {
    client: Arc<PortalClient>,
    store: Arc<dyn SessionStore>,
    credentials: PortalCredentials,
    offset: FixedOffset,
    current: Mutex<Option<Session>>,
}

impl SessionManager {
    pub fn new(
        client: Arc<PortalClient>,
        store: Arc<dyn SessionStore>,
        credentials: PortalCredentials,
        offset: FixedOffset,
    ) -> Self {
        Self {
            client,
            store,
            credentials,
            offset,
            current: Mutex::new(None),
        }
    }

    /// The calendar date at the storefront.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }

    /// The session to use right now. On first use, today's stored record is
    /// adopted if there is one; otherwise this is the empty session and the
    /// first failed fetch triggers a login.
    pub async fn current_session(&self) -> Session {
        let mut current = self.current.lock().await;
        if let Some(session) = current.as_ref() {
            return session.clone();
        }

        let session = self.restore().await;
        *current = Some(session.clone());
        session
    }

    async fn restore(&self) -> Session {
        let today = self.today();
        match self.store.latest().await {
            Ok(Some(record)) if record.is_current(today) => {
                self.client
                    .add_session_cookie(&record.cookie_name, &record.cookie_value);
                tracing::info!(instance_id = record.instance_id, "Reusing today's portal session");
                record.session()
            }
            Ok(Some(record)) => {
                tracing::debug!(acquired_on = %record.acquired_on, "Stored portal session is stale");
                Session::empty()
            }
            Ok(None) => Session::empty(),
            Err(e) => {
                tracing::warn!("Failed to load stored portal session: {}", e);
                Session::empty()
            }
        }
    }

    /// Log in again, unconditionally, and replace the current session.
    pub async fn refresh(&self) -> Result<Session> {
        let mut current = self.current.lock().await;
        tracing::info!("Acquiring new portal session");

        let session = match self.login().await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Portal login failed: {}", e);
                return Err(e);
            }
        };

        metrics::counter!("portal_logins_total").increment(1);
        *current = Some(session.clone());
        Ok(session)
    }

    async fn login(&self) -> Result<Session> {
        let page = self.client.login_page().await?;
        let form = LoginForm::from_html(&page)?;
        let instance_id = form.numeric_instance()?;

        let cookies = self.client.submit_login(&form, &self.credentials).await?;
        let (cookie_name, cookie_value) = parse_session_cookie(&cookies)?;
        self.client.add_session_cookie(&cookie_name, &cookie_value);

        let landing = self.client.landing_page(&form.instance_id).await?;
        let ajax_token = extract_ajax_token(&landing)?;

        let record = self
            .store
            .save_session(NewSessionRecord {
                instance_id,
                cookie_name,
                cookie_value,
                ajax_token,
                acquired_on: self.today(),
            })
            .await?;

        tracing::info!(instance_id = record.instance_id, record_id = record.id, "Portal session acquired");
        Ok(record.session())
    }
}
