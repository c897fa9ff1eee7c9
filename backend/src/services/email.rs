use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Invalid message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("Message rejected: {0}")]
    Rejected(String),
}

/// One campaign email, already personalised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to_email: String,
    pub to_name: Option<String>,
    /// Sender overrides; the service defaults apply when unset
    pub from_email: Option<String>,
    pub from_name: Option<String>,
    pub subject: String,
    pub body: String,
}

/// Delivery of outbound campaign email.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), EmailError>;
}

#[derive(Debug, Clone)]
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl EmailService {
    pub fn new(smtp_config: &SmtpConfig) -> Result<Self, EmailError> {
        let creds = Credentials::new(
            smtp_config.username.clone(),
            smtp_config.password.clone(),
        );

        let builder = if smtp_config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp_config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
        };

        let transport = builder
            .port(smtp_config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(EmailService {
            transport,
            from_email: smtp_config.from_email.clone(),
            from_name: smtp_config.from_name.clone(),
        })
    }

    fn build_message(&self, email: &OutboundEmail) -> Result<Message, EmailError> {
        let from = Mailbox::new(
            Some(email.from_name.clone().unwrap_or_else(|| self.from_name.clone())),
            email
                .from_email
                .as_deref()
                .unwrap_or(&self.from_email)
                .parse::<Address>()?,
        );
        let to = Mailbox::new(email.to_name.clone(), email.to_email.parse::<Address>()?);

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())?;

        Ok(message)
    }
}

#[async_trait]
impl EmailSender for EmailService {
    async fn send(&self, email: &OutboundEmail) -> Result<(), EmailError> {
        let message = self.build_message(email)?;

        match self.transport.send(message).await {
            Ok(response) if response.is_positive() => {
                info!("Email sent successfully to {}", email.to_email);
                Ok(())
            }
            Ok(response) => {
                let reason = response.message().collect::<Vec<_>>().join(" ");
                error!("SMTP server rejected email to {}: {}", email.to_email, reason);
                Err(EmailError::Rejected(reason))
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", email.to_email, e);
                Err(e.into())
            }
        }
    }
}
