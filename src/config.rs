use chrono::{FixedOffset, Offset, Utc};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub portal: PortalConfig,
    pub scheduler: SchedulerConfig,
    pub notifications: NotificationsConfig,
    pub locale: LocaleConfig,
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
}

/// Where the storefront portal lives and how to address its pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    pub base_url: String,
    /// Application (flow) identifier shared by every page of the portal.
    pub flow_id: String,
    pub login_page: String,
    pub landing_page: String,
    /// Store whose shelf prices are looked up.
    pub store_id: String,
    pub cookie_domain: String,
    pub cookie_secure: bool,
    /// Local lifetime given to the session cookie, independent of the server's.
    pub cookie_ttl_days: i64,
    /// Connect and read timeout for every portal call, in seconds.
    pub request_timeout: u64,
    pub user_agent: String,
    pub credentials: PortalCredentials,
}

impl PortalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PortalCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for PortalCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Six-field cron expression (sec min hour day month weekday), evaluated in UTC.
    pub cron: String,
    /// Pause between two product lookups, in milliseconds.
    pub item_delay_ms: u64,
    /// Header a trusted scheduler sets on on-demand trigger requests.
    pub trigger_header: String,
}

impl SchedulerConfig {
    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub smtp: SmtpConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
    pub from_name: String,
    pub recipient: Option<String>,
    pub use_tls: bool,
}

impl SmtpConfig {
    /// Mail is only sent when a relay, a sender and a recipient are all known.
    pub fn is_configured(&self) -> bool {
        self.host.is_some() && self.from_address.is_some() && self.recipient.is_some()
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from_address", &self.from_address)
            .field("from_name", &self.from_name)
            .field("recipient", &self.recipient)
            .field("use_tls", &self.use_tls)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocaleConfig {
    /// Offset of the storefront's local time from UTC, in minutes.
    pub utc_offset_minutes: i32,
    /// Local hour at which cached price responses expire.
    pub price_refresh_hour: u32,
}

impl LocaleConfig {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Directory for daily-rolling log files; stdout only when unset.
    pub directory: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default"))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "SHELF_"
            .add_source(Environment::with_prefix("SHELF").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("Server port must be greater than 0".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Message("Database min_connections cannot exceed max_connections".into()));
        }

        if Url::parse(&self.portal.base_url).is_err() {
            return Err(ConfigError::Message("Invalid portal base URL format".into()));
        }

        if self.portal.request_timeout == 0 {
            return Err(ConfigError::Message("Portal request_timeout must be greater than 0".into()));
        }

        if self.portal.cookie_ttl_days <= 0 {
            return Err(ConfigError::Message("Portal cookie_ttl_days must be greater than 0".into()));
        }

        if self.portal.credentials.username.is_empty() || self.portal.credentials.password.is_empty() {
            return Err(ConfigError::Message("Portal credentials must be provided".into()));
        }

        if !is_valid_cron(&self.scheduler.cron) {
            return Err(ConfigError::Message("Invalid cron expression in scheduler.cron".into()));
        }

        if self.scheduler.trigger_header.trim().is_empty() {
            return Err(ConfigError::Message("Scheduler trigger_header cannot be empty".into()));
        }

        if self.notifications.smtp.port == 0 {
            return Err(ConfigError::Message("SMTP port must be greater than 0".into()));
        }

        if self.locale.utc_offset_minutes.abs() > 18 * 60 {
            return Err(ConfigError::Message("Locale utc_offset_minutes must be within +/-18 hours".into()));
        }

        if self.locale.price_refresh_hour > 23 {
            return Err(ConfigError::Message("Locale price_refresh_hour must be between 0 and 23".into()));
        }

        if self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        Ok(())
    }
}

/// Basic cron validation for the scheduler's six-field format
/// (second minute hour day month weekday).
pub fn is_valid_cron(cron_expr: &str) -> bool {
    let parts: Vec<&str> = cron_expr.split_whitespace().collect();
    if parts.len() != 6 {
        return false;
    }

    parts.iter().all(|part| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '*' | '-' | ',' | '/' | '?'))
    })
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 2,
            min_connections: 1,
            acquire_timeout: 10,
        },
        portal: PortalConfig {
            base_url: "https://portal.example.com/ords".to_string(),
            flow_id: "120".to_string(),
            login_page: "101".to_string(),
            landing_page: "1".to_string(),
            store_id: "42".to_string(),
            cookie_domain: "portal.example.com".to_string(),
            cookie_secure: true,
            cookie_ttl_days: 10,
            request_timeout: 2,
            user_agent: "ShelfWatcher/1.0".to_string(),
            credentials: PortalCredentials {
                username: "watcher".to_string(),
                password: "hunter2".to_string(),
            },
        },
        scheduler: SchedulerConfig {
            cron: "0 0 6 * * *".to_string(),
            item_delay_ms: 1000,
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
                use_tls: true,
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
