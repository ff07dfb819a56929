//! Contact submission delivery over SMTP

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::EmailConfig;
use crate::error::{GatewayError, Result};
use crate::middleware::ContactRequest;

/// Subject line of every contact email
pub const CONTACT_SUBJECT: &str = "New contact submission";

/// Delivery errors
#[derive(Error, Debug)]
pub enum MailerError {
    #[error("Invalid address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("Cannot build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Hands validated contact submissions to whoever handles them
#[async_trait]
pub trait ContactNotifier: Send + Sync {
    async fn deliver(&self, contact: &ContactRequest) -> std::result::Result<(), MailerError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Used when email delivery is disabled
pub struct LogNotifier;

#[async_trait]
impl ContactNotifier for LogNotifier {
    async fn deliver(&self, contact: &ContactRequest) -> std::result::Result<(), MailerError> {
        info!(
            name = %contact.name,
            phone = %contact.phone,
            "Contact submission received; email delivery disabled"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Sends one plain-text email per submission through any lettre transport
pub struct Mailer<T> {
    transport: T,
    from: Mailbox,
    to: Mailbox,
}

fn parse_mailbox(address: &str) -> std::result::Result<Mailbox, MailerError> {
    address.parse::<Mailbox>().map_err(|e| MailerError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

impl<T> Mailer<T> {
    pub fn new(transport: T, from: &str, to: &str) -> std::result::Result<Self, MailerError> {
        Ok(Self {
            transport,
            from: parse_mailbox(from)?,
            to: parse_mailbox(to)?,
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Build the email for one submission
    pub fn compose(&self, contact: &ContactRequest) -> std::result::Result<Message, MailerError> {
        Ok(Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(CONTACT_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(format!("Name: {}\nPhone: {}\n", contact.name, contact.phone))?)
    }
}

#[async_trait]
impl<T> ContactNotifier for Mailer<T>
where
    T: AsyncTransport + Send + Sync,
    T::Ok: Send,
    T::Error: std::fmt::Display + Send,
{
    async fn deliver(&self, contact: &ContactRequest) -> std::result::Result<(), MailerError> {
        let message = self.compose(contact)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailerError::Transport(e.to_string()))?;

        debug!(to = %self.to, "Contact email sent");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

/// Build the notifier named by the email section.
///
/// No connection is made here; the SMTP pool connects on first send.
pub fn from_config(config: &EmailConfig) -> Result<Arc<dyn ContactNotifier>> {
    if !config.enabled {
        info!("Email delivery disabled; contact submissions are logged only");
        return Ok(Arc::new(LogNotifier));
    }

    let builder = if config.use_tls {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host).map_err(|e| {
            GatewayError::Config(format!("Cannot use SMTP host '{}': {}", config.smtp_host, e))
        })?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
    };

    let mut builder = builder
        .port(config.smtp_port)
        .timeout(Some(Duration::from_secs(config.timeout_secs)));

    if let Some(username) = &config.smtp_username {
        let password = config
            .smtp_password
            .as_ref()
            .map(|p| p.expose_secret().clone())
            .unwrap_or_default();
        builder = builder.credentials(Credentials::new(username.clone(), password));
    }

    let mailer = Mailer::new(builder.build(), &config.from, &config.to)
        .map_err(|e| GatewayError::Config(e.to_string()))?;

    info!(
        host = %config.smtp_host,
        port = config.smtp_port,
        tls = config.use_tls,
        to = %config.to,
        "Email delivery enabled"
    );
    Ok(Arc::new(mailer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lettre::transport::stub::AsyncStubTransport;

    fn contact() -> ContactRequest {
        ContactRequest {
            name: "Ada Lovelace".to_string(),
            phone: "555-123-4567".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mailer_sends_one_message() {
        let mailer = Mailer::new(
            AsyncStubTransport::new_ok(),
            "no-reply@example.com",
            "Sales <sales@example.com>",
        )
        .unwrap();

        mailer.deliver(&contact()).await.unwrap();

        let sent = mailer.transport().messages().await;
        assert_eq!(sent.len(), 1);
        let (envelope, raw) = &sent[0];
        assert_eq!(envelope.to()[0].to_string(), "sales@example.com");
        assert!(raw.contains("Subject: New contact submission"));
        assert!(raw.contains("Name: Ada Lovelace"));
        assert!(raw.contains("Phone: 555-123-4567"));
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported() {
        let mailer = Mailer::new(
            AsyncStubTransport::new_error(),
            "no-reply@example.com",
            "contact@example.com",
        )
        .unwrap();

        let err = mailer.deliver(&contact()).await.unwrap_err();
        assert!(matches!(err, MailerError::Transport(_)));
    }

    #[test]
    fn test_bad_address_rejected() {
        let err = Mailer::new(AsyncStubTransport::new_ok(), "nobody", "contact@example.com")
            .err()
            .unwrap();
        assert!(matches!(err, MailerError::Address { .. }));
    }

    #[tokio::test]
    async fn test_from_config() {
        let notifier = from_config(&EmailConfig::default()).unwrap();
        assert_eq!(notifier.name(), "log");
        assert!(notifier.deliver(&contact()).await.is_ok());

        let mut config = EmailConfig::default();
        config.enabled = true;
        config.use_tls = false;
        config.smtp_username = Some("mailer".to_string());
        assert_eq!(from_config(&config).unwrap().name(), "smtp");

        config.from = "not an address".to_string();
        assert!(matches!(from_config(&config), Err(GatewayError::Config(_))));
    }
}
