//! Payment processor - applies repayments under row-level locking
//!
//! The whole operation is one transaction: lock the loan row, validate the
//! state and amount against the locked balances, update the ledger fields,
//! insert the payment row, commit. Any failure rolls the lot back, so a
//! failed attempt leaves neither a loan mutation nor a payment row behind.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{unique_violation, ApiError, ApiResult};
use crate::loan::{Loan, LoanStatus};
use crate::payment::{
    generate_transaction_id, LedgerDelta, Payment, PaymentResult, PaymentStatus,
};

/// How many transaction ids to try before giving up on a conflict storm.
const TRANSACTION_ID_ATTEMPTS: u32 = 5;

/// Validated payment input handed to the processor
#[derive(Debug, Clone)]
pub struct PaymentInput {
    pub amount: rust_decimal::Decimal,
    pub method: String,
    pub notes: Option<String>,
}

/// Payment service applying repayments to loan ledgers
pub struct PaymentService {
    db_pool: PgPool,
    lock_timeout_ms: u64,
}

impl PaymentService {
    /// Create a new payment service instance
    pub fn new(db_pool: PgPool, lock_timeout_ms: u64) -> Self {
        Self {
            db_pool,
            lock_timeout_ms,
        }
    }

    /// Apply a single repayment to a loan.
    ///
    /// Concurrent payments against the same loan serialize on the row lock,
    /// so the overpayment check always sees the latest balances. A lock
    /// that cannot be acquired within the configured budget fails with a
    /// retryable concurrency error.
    pub async fn apply_payment(
        &self,
        loan_id: Uuid,
        input: PaymentInput,
        actor_id: Uuid,
    ) -> ApiResult<PaymentResult> {
        let mut tx = self.db_pool.begin().await?;

        let stmt = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout_ms);
        sqlx::query(&stmt).execute(&mut *tx).await?;

        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(loan_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Loan {} not found", loan_id)))?;

        if !loan.status.accepts_payments() {
            return Err(ApiError::InvalidLoanState(format!(
                "payments can only be made against active or overdue loans, not {}",
                loan.status
            )));
        }

        // An active loan always has a total; the guard above excludes the
        // pre-approval states where it is null.
        let total_amount = loan.total_amount.ok_or_else(|| {
            ApiError::Internal(format!("loan {} is payable but has no total", loan.id))
        })?;

        let delta = LedgerDelta::compute(total_amount, loan.paid_amount, input.amount)?;

        let now = Utc::now();
        let new_status = if delta.completes_loan {
            LoanStatus::Completed
        } else {
            loan.status
        };

        sqlx::query(
            r#"
            UPDATE loans SET
                paid_amount = $1, remaining_amount = $2, status = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(delta.new_paid)
        .bind(delta.new_remaining)
        .bind(new_status)
        .bind(now)
        .bind(loan_id)
        .execute(&mut *tx)
        .await?;

        let payment = self
            .insert_payment(&mut tx, loan_id, &input, actor_id)
            .await?;

        tx.commit().await?;

        tracing::info!(
            loan_id = %loan_id,
            payment_id = %payment.id,
            amount = %input.amount,
            remaining = %delta.new_remaining,
            completed = delta.completes_loan,
            "Payment applied"
        );

        Ok(PaymentResult {
            payment_id: payment.id,
            transaction_id: payment.transaction_id,
            remaining_balance: delta.new_remaining,
            is_loan_completed: delta.completes_loan,
        })
    }

    /// List payments recorded against a loan, newest first
    pub async fn list_payments(&self, loan_id: Uuid) -> ApiResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE loan_id = $1 ORDER BY payment_date DESC",
        )
        .bind(loan_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(payments)
    }

    async fn insert_payment(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        loan_id: Uuid,
        input: &PaymentInput,
        actor_id: Uuid,
    ) -> ApiResult<Payment> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let now = Utc::now();

            let result = sqlx::query_as::<_, Payment>(
                r#"
                INSERT INTO payments (
                    id, loan_id, amount, payment_date, status, method,
                    transaction_id, received_by, notes, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $4)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(loan_id)
            .bind(input.amount)
            .bind(now)
            .bind(PaymentStatus::Completed)
            .bind(&input.method)
            .bind(generate_transaction_id(now))
            .bind(actor_id)
            .bind(&input.notes)
            .fetch_one(&mut **tx)
            .await;

            match result {
                Ok(payment) => return Ok(payment),
                Err(err)
                    if unique_violation(&err) == Some("payments_transaction_id_key")
                        && attempts < TRANSACTION_ID_ATTEMPTS =>
                {
                    tracing::debug!(attempts, "Transaction id collision, regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
