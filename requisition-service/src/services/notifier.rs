//! Review notifications.
//!
//! One outbound message: "evidence ready for review", sent to the
//! configured reviewer address when an evidence entry is recorded. A
//! missing recipient address is a fatal misconfiguration and must fail
//! the calling operation, never silently succeed.

use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("No review recipient configured")]
    NoRecipient,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Send error: {0}")]
    SendFailed(String),
}

/// Payload for the review notification.
#[derive(Debug, Clone)]
pub struct EvidenceReadyMessage {
    pub requisition_id: Uuid,
    pub folio: String,
    pub total: Decimal,
    pub note: String,
}

#[async_trait]
pub trait ReviewNotifier: Send + Sync {
    /// The configured recipient, if any. Callers check this before doing
    /// any work so a misconfigured deployment fails up front.
    fn recipient(&self) -> Option<&str>;

    async fn evidence_ready(&self, message: &EvidenceReadyMessage) -> Result<(), NotifierError>;
}

pub struct SmtpNotifier {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Result<Self, NotifierError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| {
                NotifierError::Configuration(format!("Failed to create SMTP relay: {}", e))
            })?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self { config, transport })
    }
}

#[async_trait]
impl ReviewNotifier for SmtpNotifier {
    fn recipient(&self) -> Option<&str> {
        self.config.review_recipient.as_deref()
    }

    async fn evidence_ready(&self, message: &EvidenceReadyMessage) -> Result<(), NotifierError> {
        let recipient = self.recipient().ok_or(NotifierError::NoRecipient)?;

        let from_mailbox: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| NotifierError::Configuration(format!("Invalid from address: {}", e)))?;

        let to_mailbox: Mailbox = recipient
            .parse()
            .map_err(|e| NotifierError::Configuration(format!("Invalid recipient: {}", e)))?;

        let body = format!(
            "Requisition {folio} ({id}) has evidence ready for review.\n\
             Authorized total: {total}\n\n{note}\n",
            folio = message.folio,
            id = message.requisition_id,
            total = message.total,
            note = message.note,
        );

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(format!("Evidence ready for review: {}", message.folio))
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| NotifierError::SendFailed(format!("Failed to build message: {}", e)))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifierError::SendFailed(format!("Failed to send email: {}", e)))?;

        tracing::info!(
            folio = %message.folio,
            requisition_id = %message.requisition_id,
            "Review notification sent"
        );

        Ok(())
    }
}

/// Mock notifier for tests and SMTP-less deployments.
pub struct MockNotifier {
    recipient: Option<String>,
    sent_count: AtomicU64,
}

impl MockNotifier {
    pub fn new(recipient: Option<String>) -> Self {
        Self {
            recipient,
            sent_count: AtomicU64::new(0),
        }
    }

    pub fn sent_count(&self) -> u64 {
        self.sent_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReviewNotifier for MockNotifier {
    fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }

    async fn evidence_ready(&self, message: &EvidenceReadyMessage) -> Result<(), NotifierError> {
        if self.recipient.is_none() {
            return Err(NotifierError::NoRecipient);
        }

        self.sent_count.fetch_add(1, Ordering::SeqCst);

        tracing::info!(
            folio = %message.folio,
            requisition_id = %message.requisition_id,
            "[MOCK] Review notification would be sent"
        );

        Ok(())
    }
}
