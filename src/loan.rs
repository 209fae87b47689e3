//! Loan models and lifecycle rules
//!
//! The status enum owns the legal-transition table; services consult it
//! before mutating a row so every path through the system enforces the
//! same lifecycle.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::error::ApiError;
use crate::rates;

/// Loan status enum
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
    Active,
    Completed,
    Defaulted,
    Overdue,
}

impl LoanStatus {
    /// Statuses that count as an unsettled obligation for the
    /// one-loan-per-borrower rule.
    pub const UNSETTLED: [LoanStatus; 4] = [
        LoanStatus::Pending,
        LoanStatus::Approved,
        LoanStatus::Active,
        LoanStatus::Defaulted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Defaulted => "defaulted",
            Self::Overdue => "overdue",
        }
    }

    /// Legal status transitions. Everything not listed is rejected.
    pub fn can_transition_to(&self, next: LoanStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active)
                | (Self::Pending, Self::Rejected)
                | (Self::Approved, Self::Active)
                | (Self::Active, Self::Completed)
                | (Self::Active, Self::Overdue)
                | (Self::Overdue, Self::Completed)
                | (Self::Overdue, Self::Defaulted)
        )
    }

    /// Payments are accepted only while the loan is active or overdue;
    /// a late borrower may still pay off an overdue loan.
    pub fn accepts_payments(&self) -> bool {
        matches!(self, Self::Active | Self::Overdue)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Defaulted)
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Loan model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Loan {
    pub id: Uuid,
    pub loan_number: String,
    pub borrower_id: Uuid,
    pub principal: Decimal,
    pub term_weeks: i32,
    pub purpose: String,
    pub collateral_images: Vec<String>,
    pub status: LoanStatus,
    pub interest_rate: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub paid_amount: Decimal,
    pub remaining_amount: Option<Decimal>,
    pub approver_id: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_reason: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub reminder_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated application input handed to the core; collateral has already
/// been stored and reduced to opaque references by the upload pipeline.
#[derive(Debug, Clone)]
pub struct NewLoanApplication {
    pub borrower_id: Uuid,
    pub principal: Decimal,
    pub term_weeks: i32,
    pub purpose: String,
    pub collateral_refs: Vec<String>,
}

pub const MIN_PRINCIPAL: Decimal = Decimal::from_parts(200, 0, 0, false, 0);
pub const MAX_PRINCIPAL: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

fn validate_principal(principal: &Decimal) -> Result<(), ValidationError> {
    if *principal < MIN_PRINCIPAL {
        return Err(ValidationError::new("principal_below_minimum"));
    }
    if *principal > MAX_PRINCIPAL {
        return Err(ValidationError::new("principal_above_maximum"));
    }
    Ok(())
}

/// Request to apply for a loan; collateral arrives as base64 data URLs
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLoanRequest {
    #[validate(custom = "validate_principal")]
    pub principal: Decimal,

    #[validate(range(min = 1, max = 4))]
    pub term_weeks: i32,

    #[validate(length(min = 3, max = 500))]
    pub purpose: String,

    #[validate(length(min = 1, max = 10))]
    pub collateral_images: Vec<String>,
}

/// Staff decision on a pending application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

/// Request body for the approve/reject endpoint
#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: Decision,
    pub reason: Option<String>,
}

/// Query for listing loans
#[derive(Debug, Default, Deserialize)]
pub struct ListLoansQuery {
    pub borrower_id: Option<Uuid>,
    pub status: Option<LoanStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Financial terms fixed at approval time
#[derive(Debug, Clone, Copy)]
pub struct ApprovalTerms {
    pub interest_rate: Decimal,
    pub total_amount: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl ApprovalTerms {
    /// Compute the terms for an approval happening at `now`. The rate is
    /// looked up from the policy table; the total is rounded to cents once
    /// here and never recomputed.
    pub fn compute(
        principal: Decimal,
        term_weeks: i32,
        now: DateTime<Utc>,
    ) -> Result<Self, ApiError> {
        let interest_rate = rates::rate_for(term_weeks)?;
        let total_amount = (principal + principal * interest_rate).round_dp(2);

        Ok(Self {
            interest_rate,
            total_amount,
            start_date: now,
            end_date: now + Duration::weeks(i64::from(term_weeks)),
        })
    }
}

/// Generate a human-readable loan number: `LN-DDMMHHmm-XXXX`.
///
/// The timestamp segment only has minute resolution, so collisions are
/// possible by construction; callers insert under the unique index and
/// regenerate on conflict.
pub fn generate_loan_number(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(1000..10000);
    format!("LN-{}-{}", now.format("%d%m%H%M"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    #[test]
    fn pending_can_only_be_decided() {
        assert!(LoanStatus::Pending.can_transition_to(LoanStatus::Active));
        assert!(LoanStatus::Pending.can_transition_to(LoanStatus::Rejected));
        assert!(!LoanStatus::Pending.can_transition_to(LoanStatus::Completed));
        assert!(!LoanStatus::Pending.can_transition_to(LoanStatus::Overdue));
        assert!(!LoanStatus::Pending.can_transition_to(LoanStatus::Defaulted));
    }

    #[test]
    fn active_completes_or_goes_overdue() {
        assert!(LoanStatus::Active.can_transition_to(LoanStatus::Completed));
        assert!(LoanStatus::Active.can_transition_to(LoanStatus::Overdue));
        assert!(!LoanStatus::Active.can_transition_to(LoanStatus::Rejected));
        assert!(!LoanStatus::Active.can_transition_to(LoanStatus::Pending));
    }

    #[test]
    fn overdue_loans_can_still_be_paid_off() {
        assert!(LoanStatus::Overdue.can_transition_to(LoanStatus::Completed));
        assert!(LoanStatus::Overdue.can_transition_to(LoanStatus::Defaulted));
        assert!(LoanStatus::Overdue.accepts_payments());
    }

    #[test]
    fn terminal_states_admit_nothing() {
        for terminal in [
            LoanStatus::Rejected,
            LoanStatus::Completed,
            LoanStatus::Defaulted,
        ] {
            assert!(terminal.is_terminal());
            for next in [
                LoanStatus::Pending,
                LoanStatus::Approved,
                LoanStatus::Rejected,
                LoanStatus::Active,
                LoanStatus::Completed,
                LoanStatus::Defaulted,
                LoanStatus::Overdue,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
            assert!(!terminal.accepts_payments());
        }
    }

    #[test]
    fn payments_only_from_active_or_overdue() {
        assert!(LoanStatus::Active.accepts_payments());
        assert!(LoanStatus::Overdue.accepts_payments());
        assert!(!LoanStatus::Pending.accepts_payments());
        assert!(!LoanStatus::Approved.accepts_payments());
    }

    #[test]
    fn approval_terms_for_two_weeks() {
        let now = Utc::now();
        let terms = ApprovalTerms::compute(dec!(1000), 2, now).unwrap();

        assert_eq!(terms.interest_rate, dec!(0.25));
        assert_eq!(terms.total_amount, dec!(1250.00));
        assert_eq!(terms.start_date, now);
        assert_eq!(terms.end_date, now + Duration::days(14));
    }

    #[test]
    fn approval_terms_round_to_cents() {
        let terms = ApprovalTerms::compute(dec!(333.33), 3, Utc::now()).unwrap();
        // 333.33 * 1.35 = 449.9955 -> 450.00
        assert_eq!(terms.total_amount, dec!(450.00));
    }

    #[test]
    fn approval_terms_reject_bad_terms() {
        let err = ApprovalTerms::compute(dec!(1000), 5, Utc::now()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TERM");
    }

    #[test]
    fn loan_number_format() {
        let number = generate_loan_number(Utc::now());
        let parts: Vec<&str> = number.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "LN");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn loan_numbers_unique_with_retry() {
        // The generator alone is not collision-free; with regenerate-on-
        // conflict (as the insert path does against the unique index) 10k
        // numbers in the same minute stay distinct.
        let now = Utc::now();
        let mut seen = HashSet::new();

        for _ in 0..10_000 {
            let mut attempts = 0;
            loop {
                attempts += 1;
                assert!(attempts <= 100, "retry loop failed to converge");
                if seen.insert(generate_loan_number(now)) {
                    break;
                }
            }
        }

        assert_eq!(seen.len(), 10_000);
    }

    #[test]
    fn create_request_bounds() {
        let valid = CreateLoanRequest {
            principal: dec!(500),
            term_weeks: 2,
            purpose: "Stock for my shop".to_string(),
            collateral_images: vec!["data:image/png;base64,AAAA".to_string()],
        };
        assert!(valid.validate().is_ok());

        let too_small = CreateLoanRequest {
            principal: dec!(199.99),
            ..valid_request()
        };
        assert!(too_small.validate().is_err());

        let too_large = CreateLoanRequest {
            principal: dec!(1000000.01),
            ..valid_request()
        };
        assert!(too_large.validate().is_err());

        let bad_term = CreateLoanRequest {
            term_weeks: 5,
            ..valid_request()
        };
        assert!(bad_term.validate().is_err());

        let no_images = CreateLoanRequest {
            collateral_images: vec![],
            ..valid_request()
        };
        assert!(no_images.validate().is_err());
    }

    fn valid_request() -> CreateLoanRequest {
        CreateLoanRequest {
            principal: dec!(500),
            term_weeks: 2,
            purpose: "Stock for my shop".to_string(),
            collateral_images: vec!["data:image/png;base64,AAAA".to_string()],
        }
    }
}
