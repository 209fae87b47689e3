//! Payment models and ledger arithmetic
//!
//! `LedgerDelta` is the pure half of the payment processor: given the
//! locked loan's balances it decides what the payment does, with no I/O.
//! The service layer applies the delta inside the row-locked transaction.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;

/// Payment status enum
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

/// Payment model, immutable once created
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub amount: Decimal,
    pub payment_date: DateTime<Utc>,
    pub status: PaymentStatus,
    pub method: String,
    pub transaction_id: String,
    pub received_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request to record a repayment
#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,

    #[validate(length(min = 1, max = 50))]
    pub method: String,

    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Outcome of a successful payment
#[derive(Debug, Serialize)]
pub struct PaymentResult {
    pub payment_id: Uuid,
    pub transaction_id: String,
    pub remaining_balance: Decimal,
    pub is_loan_completed: bool,
}

/// The balance changes a payment would produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerDelta {
    pub new_paid: Decimal,
    pub new_remaining: Decimal,
    pub completes_loan: bool,
}

impl LedgerDelta {
    /// Apply `amount` against a loan's balances. Overpayments are rejected
    /// outright so the caller can prompt for the correct amount; nothing is
    /// clamped. All values are cent-rounded decimals, so the completion
    /// check is an exact comparison.
    pub fn compute(
        total_amount: Decimal,
        paid_amount: Decimal,
        amount: Decimal,
    ) -> Result<Self, ApiError> {
        if amount <= Decimal::ZERO {
            return Err(ApiError::InvalidAmount);
        }

        let new_paid = paid_amount + amount;
        let new_remaining = total_amount - new_paid;

        if new_remaining < Decimal::ZERO {
            return Err(ApiError::Overpayment);
        }

        Ok(Self {
            new_paid,
            new_remaining,
            completes_loan: new_remaining <= Decimal::ZERO,
        })
    }
}

/// Generate a globally unique transaction id: `txn-<millis>-lnp-<RANDOM>`.
pub fn generate_transaction_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect::<String>()
        .to_uppercase();

    format!("txn-{}-lnp-{}", now.timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn partial_payment_reduces_balance() {
        let delta = LedgerDelta::compute(dec!(1250.00), dec!(0), dec!(500)).unwrap();
        assert_eq!(delta.new_paid, dec!(500));
        assert_eq!(delta.new_remaining, dec!(750.00));
        assert!(!delta.completes_loan);
    }

    #[test]
    fn exact_payoff_completes_loan() {
        let delta = LedgerDelta::compute(dec!(1250.00), dec!(0), dec!(1250.00)).unwrap();
        assert_eq!(delta.new_remaining, dec!(0));
        assert!(delta.completes_loan);
    }

    #[test]
    fn payoff_of_tail_balance_completes_loan() {
        let delta = LedgerDelta::compute(dec!(1250.00), dec!(1249.99), dec!(0.01)).unwrap();
        assert_eq!(delta.new_paid, dec!(1250.00));
        assert_eq!(delta.new_remaining, dec!(0.00));
        assert!(delta.completes_loan);
    }

    #[test]
    fn overpayment_is_rejected_not_clamped() {
        let err = LedgerDelta::compute(dec!(1250.00), dec!(1000), dec!(250.01)).unwrap_err();
        assert_eq!(err.error_code(), "OVERPAYMENT");
    }

    #[test]
    fn zero_and_negative_amounts_are_rejected() {
        for amount in [dec!(0), dec!(-1), dec!(-0.01)] {
            let err = LedgerDelta::compute(dec!(1250.00), dec!(0), amount).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_AMOUNT");
        }
    }

    #[test]
    fn remaining_always_equals_total_minus_paid() {
        let total = dec!(450.00);
        let mut paid = Decimal::ZERO;

        for amount in [dec!(100), dec!(200), dec!(150)] {
            let delta = LedgerDelta::compute(total, paid, amount).unwrap();
            assert_eq!(delta.new_remaining, total - delta.new_paid);
            assert!(delta.new_remaining >= Decimal::ZERO);
            paid = delta.new_paid;
        }

        assert_eq!(paid, total);
    }

    #[test]
    fn transaction_id_shape() {
        let id = generate_transaction_id(Utc::now());
        assert!(id.starts_with("txn-"));
        assert!(id.contains("-lnp-"));
        let suffix = id.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
