use async_trait::async_trait;
use lettre::message::{header, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::notifiers::Notifier;
use crate::utils::error::{AppError, Result};

/// Sends notifications over SMTP. The relay and its credentials come from
/// configuration and are fixed for the life of the process.
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let (Some(host), Some(from_address), Some(recipient)) =
            (&config.host, &config.from_address, &config.recipient)
        else {
            return Err(AppError::Validation(
                "SMTP host, from_address and recipient are required for email".into(),
            ));
        };

        let from = format!("{} <{}>", config.from_name, from_address).parse()?;
        let to = recipient.parse()?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        }
        .port(config.port);

        let mailer = match (&config.username, &config.password) {
            (Some(username), Some(password)) => builder
                .credentials(Credentials::new(username.clone(), password.clone()))
                .build(),
            _ => builder.build(),
        };

        Ok(Self { mailer, from, to })
    }

    fn build_message(&self, subject: &str, body: &str) -> Result<Message> {
        Ok(Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(html_body(body)),
                    ),
            )?)
    }
}

fn html_body(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><body><pre style=\"font-family: monospace\">{}</pre></body></html>",
        escape_html(body)
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let message = self.build_message(subject, body)?;
        self.mailer.send(message).await?;
        tracing::info!(subject = %subject, to = %self.to.email, "Notification email sent");
        Ok(())
    }
}
