use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::models::{parse_price, ProductSnapshot, Session};
use crate::portal::client::PortalClient;
use crate::portal::session::SessionManager;
use crate::utils::error::Result;

/// Where current prices come from.
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// `Ok(None)` means the portal does not know the code. Transport failures
    /// are errors.
    async fn fetch_by_code(&self, code: &str) -> Result<Option<ProductSnapshot>>;
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    items: Vec<LookupItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupItem {
    description: String,
    code: String,
    sequence_code: i64,
    price: RawPrice,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPrice {
    Text(String),
    Number(serde_json::Number),
}

impl RawPrice {
    fn to_text(&self) -> String {
        match self {
            RawPrice::Text(text) => text.clone(),
            RawPrice::Number(number) => number.to_string(),
        }
    }
}

/// Outcome of one lookup attempt.
#[derive(Debug)]
enum Lookup {
    Found(ProductSnapshot),
    Absent,
    /// The body was not a lookup response at all. The portal answers a
    /// stale session this way.
    Undecodable(String),
}

/// A body counts as a lookup response only if every field decodes,
/// price included.
fn decode(body: &str) -> Lookup {
    let response: LookupResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(e) => return Lookup::Undecodable(e.to_string()),
    };

    let Some(item) = response.items.into_iter().next() else {
        return Lookup::Absent;
    };

    let current_price = match parse_price(&item.price.to_text()) {
        Ok(price) => price,
        Err(e) => return Lookup::Undecodable(e.to_string()),
    };

    Lookup::Found(ProductSnapshot {
        current_price,
        description: item.description.trim().to_string(),
        code: item.code,
        sequence_code: item.sequence_code,
        observed_at: Utc::now(),
    })
}

/// Looks products up through the portal's ajax endpoint, logging in again
/// once when the session turns out to be stale.
pub struct ProductFetcher {
    client: Arc<PortalClient>,
    sessions: Arc<SessionManager>,
}

impl ProductFetcher {
    pub fn new(client: Arc<PortalClient>, sessions: Arc<SessionManager>) -> Self {
        Self { client, sessions }
    }

    async fn attempt(&self, session: &Session, code: &str) -> Result<Lookup> {
        let body = self.client.lookup(session, code).await?;
        Ok(decode(&body))
    }
}

#[async_trait]
impl ProductSource for ProductFetcher {
    async fn fetch_by_code(&self, code: &str) -> Result<Option<ProductSnapshot>> {
        let session = self.sessions.current_session().await;

        match self.attempt(&session, code).await? {
            Lookup::Found(snapshot) => return Ok(Some(snapshot)),
            Lookup::Absent => return Ok(None),
            Lookup::Undecodable(reason) => {
                tracing::info!(code = %code, "Lookup response undecodable ({}), refreshing session", reason);
            }
        }

        metrics::counter!("portal_fetch_retries_total").increment(1);
        let session = self.sessions.refresh().await?;

        match self.attempt(&session, code).await? {
            Lookup::Found(snapshot) => Ok(Some(snapshot)),
            Lookup::Absent => Ok(None),
            Lookup::Undecodable(reason) => {
                tracing::warn!(code = %code, "Lookup still undecodable after new session: {}", reason);
                Ok(None)
            }
        }
    }
}
