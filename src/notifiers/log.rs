use async_trait::async_trait;

use crate::notifiers::Notifier;
use crate::utils::error::Result;

/// Writes notifications to the application log. Used when no mail relay is set up.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        tracing::info!(subject = %subject, "{}", body);
        Ok(())
    }
}
