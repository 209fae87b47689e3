//! Outbound notification collaborator
//!
//! The core only ever fires and forgets: a notification failure is logged
//! at the call site and never rolls back the ledger mutation that
//! triggered it. Delivery (email, SMS, whatever sits behind the webhook)
//! belongs to the surrounding services.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::loan::Loan;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn application_received(&self, loan: &Loan) -> Result<(), NotifierError>;

    async fn loan_approved(&self, loan: &Loan) -> Result<(), NotifierError>;

    async fn loan_rejected(&self, loan: &Loan, reason: &str) -> Result<(), NotifierError>;

    async fn payment_due_soon(&self, loan: &Loan) -> Result<(), NotifierError>;
}

/// Notifier that only writes to the log. Used in development and as the
/// fallback when no webhook endpoint is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn application_received(&self, loan: &Loan) -> Result<(), NotifierError> {
        tracing::info!(loan_number = %loan.loan_number, borrower_id = %loan.borrower_id,
            "Notification: application received");
        Ok(())
    }

    async fn loan_approved(&self, loan: &Loan) -> Result<(), NotifierError> {
        tracing::info!(loan_number = %loan.loan_number, borrower_id = %loan.borrower_id,
            total_amount = ?loan.total_amount, "Notification: loan approved");
        Ok(())
    }

    async fn loan_rejected(&self, loan: &Loan, reason: &str) -> Result<(), NotifierError> {
        tracing::info!(loan_number = %loan.loan_number, borrower_id = %loan.borrower_id,
            reason = %reason, "Notification: loan rejected");
        Ok(())
    }

    async fn payment_due_soon(&self, loan: &Loan) -> Result<(), NotifierError> {
        tracing::info!(loan_number = %loan.loan_number, borrower_id = %loan.borrower_id,
            end_date = ?loan.end_date, "Notification: payment due soon");
        Ok(())
    }
}

/// Event payload posted to the notification webhook
#[derive(Debug, Serialize)]
struct NotificationEvent<'a> {
    event: &'static str,
    loan_number: &'a str,
    borrower_id: uuid::Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_amount: Option<rust_decimal::Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

/// Notifier that posts events to an external delivery service.
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookNotifier {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    async fn post(&self, event: NotificationEvent<'_>) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&event)
            .send()
            .await
            .map_err(|e| NotifierError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifierError::Delivery(format!(
                "webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    fn event<'a>(&self, name: &'static str, loan: &'a Loan) -> NotificationEvent<'a> {
        NotificationEvent {
            event: name,
            loan_number: &loan.loan_number,
            borrower_id: loan.borrower_id,
            total_amount: loan.total_amount,
            end_date: loan.end_date,
            reason: None,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn application_received(&self, loan: &Loan) -> Result<(), NotifierError> {
        self.post(self.event("application_received", loan)).await
    }

    async fn loan_approved(&self, loan: &Loan) -> Result<(), NotifierError> {
        self.post(self.event("loan_approved", loan)).await
    }

    async fn loan_rejected(&self, loan: &Loan, reason: &str) -> Result<(), NotifierError> {
        let mut event = self.event("loan_rejected", loan);
        event.reason = Some(reason);
        self.post(event).await
    }

    async fn payment_due_soon(&self, loan: &Loan) -> Result<(), NotifierError> {
        self.post(self.event("payment_due_soon", loan)).await
    }
}
