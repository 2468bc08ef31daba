use async_trait::async_trait;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::config::SmtpConfig;
use crate::utils::error::Result;

pub mod email;
pub mod log;

pub use email::EmailNotifier;
pub use log::LogNotifier;

/// Delivers run summaries and failure notices to a human.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

/// Mail when SMTP is fully configured, the log otherwise.
pub fn from_config(smtp: &SmtpConfig) -> Result<Arc<dyn Notifier>> {
    if smtp.is_configured() {
        Ok(Arc::new(EmailNotifier::new(smtp)?))
    } else {
        tracing::info!("SMTP not configured, notifications go to the log");
        Ok(Arc::new(LogNotifier))
    }
}
