use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Credentials for issuing authenticated ajax requests against the portal:
/// the numeric page instance and the ajax token scraped next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Session {
    pub session_id: String,
    pub ajax_token: String,
}

impl Session {
    pub fn new(session_id: impl Into<String>, ajax_token: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ajax_token: ajax_token.into(),
        }
    }

    /// The "no session acquired yet" sentinel.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.session_id.is_empty() && self.ajax_token.is_empty()
    }
}

/// Durable copy of a session, one per calendar day.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub instance_id: i64,
    pub cookie_name: String,
    pub cookie_value: String,
    pub ajax_token: String,
    pub acquired_on: NaiveDate,
}

#[derive(Clone, PartialEq, Eq)]
pub struct NewSessionRecord {
    pub instance_id: i64,
    pub cookie_name: String,
    pub cookie_value: String,
    pub ajax_token: String,
    pub acquired_on: NaiveDate,
}

impl SessionRecord {
    pub fn session(&self) -> Session {
        Session::new(self.instance_id.to_string(), self.ajax_token.clone())
    }

    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.acquired_on == today
    }
}

// Cookie values grant portal access; keep them out of logs.
impl std::fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecord")
            .field("id", &self.id)
            .field("instance_id", &self.instance_id)
            .field("cookie_name", &self.cookie_name)
            .field("acquired_on", &self.acquired_on)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for NewSessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewSessionRecord")
            .field("instance_id", &self.instance_id)
            .field("cookie_name", &self.cookie_name)
            .field("acquired_on", &self.acquired_on)
            .finish_non_exhaustive()
    }
}
