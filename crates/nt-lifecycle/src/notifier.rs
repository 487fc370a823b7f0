// notifier.rs - Notification channels used by the dispatcher.
//
// A channel gets one fully resolved request (recipient already looked up)
// and either delivers it or says why not. Channels never touch case state.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::NotifyError;

/// Everything a channel needs to notify about one case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRequest {
    pub case_id: Uuid,
    pub radicado: String,
    pub escritura: String,
    pub protocolista: String,
    /// Address of the protocolist, resolved at send time.
    pub recipient: String,
    pub sent_by: String,
}

impl NotificationRequest {
    pub fn subject(&self, prefix: &str) -> String {
        let subject = format!("Radicado {} - Escritura {}", self.radicado, self.escritura);
        if prefix.trim().is_empty() {
            subject
        } else {
            format!("{} {}", prefix.trim(), subject)
        }
    }

    pub fn body(&self) -> String {
        format!(
            "Protocolista: {}\nEscritura: {}\nRadicado: {}\n\nEl documento del radicado {} está disponible.\n\nEnviado por: {}\n",
            self.protocolista,
            self.escritura,
            self.radicado,
            self.radicado,
            self.sent_by
        )
    }
}

/// A channel that delivers notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification.
    async fn send(&self, request: &NotificationRequest) -> Result<(), NotifyError>;

    /// Channel name for logs.
    fn name(&self) -> &str;
}

/// SMTP settings the notifier is built from.
#[derive(Clone)]
pub struct SmtpOptions {
    pub host: String,
    pub port: u16,
    pub from: String,
    pub subject_prefix: String,
    pub credentials: Option<(String, String)>,
}

/// Sends mail through an SMTP relay with STARTTLS.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    subject_prefix: String,
}

impl SmtpNotifier {
    pub fn new(options: SmtpOptions) -> Result<Self, NotifyError> {
        let from: Mailbox = options
            .from
            .parse()
            .map_err(|e| NotifyError::Invalid(format!("sender '{}': {}", options.from, e)))?;
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&options.host)
            .map_err(|e| NotifyError::Invalid(format!("smtp host '{}': {}", options.host, e)))?
            .port(options.port);
        if let Some((username, password)) = options.credentials {
            builder = builder.credentials(Credentials::new(username, password));
        }
        tracing::debug!(
            "smtp notifier ready ({}:{}, from {})",
            options.host,
            options.port,
            from
        );
        Ok(Self {
            transport: builder.build(),
            from,
            subject_prefix: options.subject_prefix,
        })
    }

    fn build_message(&self, request: &NotificationRequest) -> Result<Message, NotifyError> {
        let to: Mailbox = request.recipient.parse().map_err(|e| {
            NotifyError::Invalid(format!("recipient '{}': {}", request.recipient, e))
        })?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(request.subject(&self.subject_prefix))
            .header(ContentType::TEXT_PLAIN)
            .body(request.body())
            .map_err(|e| NotifyError::Invalid(e.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, request: &NotificationRequest) -> Result<(), NotifyError> {
        let message = self.build_message(request)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "smtp"
    }
}

/// POSTs the request as JSON to an HTTP endpoint.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Invalid(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, request: &NotificationRequest) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// Dry-run channel: logs the notification and reports success.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, request: &NotificationRequest) -> Result<(), NotifyError> {
        tracing::info!(
            "[dry run] would notify {} about radicado {} (case {})",
            request.recipient,
            request.radicado,
            request.case_id
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
