//! The caller-facing mailer.
//!
//! Without usable SMTP settings the mailer runs in mock mode: every message is
//! logged and reported as delivered, so development setups work without a
//! mail server.

use campmail_common::tracing;
use campmail_smtp::{DeliveryResult, EmailMessage, SmtpClient, SmtpSettings};
use futures_util::{StreamExt, stream};

use crate::config::Config;

#[derive(Clone)]
pub struct Mailer {
    client: SmtpClient,
    settings: Option<SmtpSettings>,
    concurrency: usize,
}

impl Mailer {
    #[must_use]
    pub fn new(client: SmtpClient, settings: Option<SmtpSettings>) -> Self {
        Self {
            client,
            settings: settings.filter(SmtpSettings::is_complete),
            concurrency: Config::default().concurrency,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.client(), config.smtp.clone()).with_concurrency(config.concurrency)
    }

    /// Deliveries in flight at once for [`Mailer::send_batch`].
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Whether messages are only logged.
    #[must_use]
    pub const fn is_mock(&self) -> bool {
        self.settings.is_none()
    }

    pub async fn send(&self, message: &EmailMessage) -> DeliveryResult {
        let Some(settings) = &self.settings else {
            tracing::info!(
                to = %message.to,
                subject = %message.subject,
                text = %message.text,
                "SMTP not configured, would have sent email"
            );
            return DeliveryResult::delivered();
        };

        self.client.deliver(settings, message).await
    }

    /// Sends each message independently, at most `concurrency` at a time.
    ///
    /// Returns one result per message, in the order given. A failed delivery
    /// does not stop the others.
    pub async fn send_all(
        &self,
        messages: &[EmailMessage],
        concurrency: usize,
    ) -> Vec<DeliveryResult> {
        let results: Vec<DeliveryResult> = stream::iter(messages)
            .map(|message| self.send(message))
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let failed = results.iter().filter(|result| !result.success).count();
        if failed > 0 {
            tracing::warn!(
                failed,
                total = messages.len(),
                "Some deliveries in the batch failed"
            );
        }

        results
    }

    /// [`Mailer::send_all`] with the configured concurrency.
    pub async fn send_batch(&self, messages: &[EmailMessage]) -> Vec<DeliveryResult> {
        self.send_all(messages, self.concurrency).await
    }
}
