use thiserror::Error;

/// Why scraping a credential-bearing value out of the portal failed.
///
/// The portal is a server-rendered application whose hidden fields move
/// between releases, so each missing piece gets its own variant instead of a
/// generic parse failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("{page} returned an empty body")]
    EmptyBody { page: &'static str },

    #[error("hidden form field `{field}` is missing from the login page")]
    MissingField { field: &'static str },

    #[error("login response carried no Set-Cookie header")]
    MissingCookie,

    #[error("malformed session cookie: {0}")]
    MalformedCookie(String),

    #[error("ajax identifier not found on the landing page")]
    MissingAjaxToken,

    #[error("instance id `{0}` is not numeric")]
    NonNumericInstance(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream returned {status} for {url}")]
    UpstreamStatus { status: u16, url: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session acquisition failed: {0}")]
    SessionAcquisition(#[from] ExtractError),

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Item not found: {code}")]
    ItemNotFound { code: String },

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),

    #[error("A reconciliation run is already in progress")]
    JobAlreadyRunning,

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Transport failures are never retried by the protocol layer; callers
    /// decide what to do with them.
    pub fn is_transport(&self) -> bool {
        matches!(self, AppError::Transport(_) | AppError::UpstreamStatus { .. })
    }

    pub fn parse(message: impl Into<String>) -> Self {
        AppError::Parse {
            message: message.into(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

impl From<lettre::error::Error> for AppError {
    fn from(err: lettre::error::Error) -> Self {
        AppError::Notification(err.to_string())
    }
}

impl From<lettre::address::AddressError> for AppError {
    fn from(err: lettre::address::AddressError) -> Self {
        AppError::Notification(format!("invalid mail address: {}", err))
    }
}

impl From<lettre::transport::smtp::Error> for AppError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        AppError::Notification(err.to_string())
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
