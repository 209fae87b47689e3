//! Loan service layer - lifecycle operations over the loans table
//!
//! All mutating operations run as single transactions with a bounded
//! row-lock budget; a lock that cannot be acquired in time surfaces as a
//! retryable concurrency error instead of blocking the caller.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{unique_violation, ApiError, ApiResult};
use crate::loan::{
    generate_loan_number, ApprovalTerms, Decision, ListLoansQuery, Loan, LoanStatus,
    NewLoanApplication, MAX_PRINCIPAL, MIN_PRINCIPAL,
};
use crate::models::PaginatedResponse;
use crate::notifier::Notifier;

/// How many fresh loan numbers to try before giving up on a conflict storm.
const LOAN_NUMBER_ATTEMPTS: u32 = 5;

/// Loan service for managing the loan lifecycle
pub struct LoanService {
    db_pool: PgPool,
    notifier: Arc<dyn Notifier>,
    lock_timeout_ms: u64,
}

impl LoanService {
    /// Create a new loan service instance
    pub fn new(db_pool: PgPool, notifier: Arc<dyn Notifier>, lock_timeout_ms: u64) -> Self {
        Self {
            db_pool,
            notifier,
            lock_timeout_ms,
        }
    }

    /// True if the borrower has a loan in any unsettled status. The same
    /// rule is enforced by a partial unique index, so this check losing a
    /// race cannot admit a second loan.
    pub async fn has_unsettled_loan(&self, borrower_id: Uuid) -> ApiResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM loans
                WHERE borrower_id = $1
                  AND status IN ('pending', 'approved', 'active', 'defaulted')
            )
            "#,
        )
        .bind(borrower_id)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(exists)
    }

    /// Submit a loan application, creating a pending loan with no financial
    /// terms yet. Fails if the borrower already has an unsettled loan.
    pub async fn submit_application(&self, input: NewLoanApplication) -> ApiResult<Loan> {
        validate_application(&input)?;

        let mut attempts = 0;
        let loan = loop {
            attempts += 1;

            let mut tx = self.db_pool.begin().await?;

            // Eligibility gate, inside the creating transaction. The
            // partial unique index backs it up under concurrency.
            let unsettled: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM loans
                    WHERE borrower_id = $1
                      AND status IN ('pending', 'approved', 'active', 'defaulted')
                )
                "#,
            )
            .bind(input.borrower_id)
            .fetch_one(&mut *tx)
            .await?;

            if unsettled {
                return Err(ApiError::DuplicateActiveLoan);
            }

            let now = Utc::now();
            let result = sqlx::query_as::<_, Loan>(
                r#"
                INSERT INTO loans (
                    id, loan_number, borrower_id, principal, term_weeks,
                    purpose, collateral_images, status, paid_amount,
                    reminder_sent, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, FALSE, $9, $9)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(generate_loan_number(now))
            .bind(input.borrower_id)
            .bind(input.principal)
            .bind(input.term_weeks)
            .bind(&input.purpose)
            .bind(&input.collateral_refs)
            .bind(LoanStatus::Pending)
            .bind(now)
            .fetch_one(&mut *tx)
            .await;

            match result {
                Ok(loan) => {
                    tx.commit().await?;
                    break loan;
                }
                Err(err) => match unique_violation(&err) {
                    Some("loans_one_unsettled_per_borrower") => {
                        return Err(ApiError::DuplicateActiveLoan);
                    }
                    Some("loans_loan_number_key") if attempts < LOAN_NUMBER_ATTEMPTS => {
                        tracing::debug!(attempts, "Loan number collision, regenerating");
                        continue;
                    }
                    _ => return Err(err.into()),
                },
            }
        };

        if let Err(err) = self.notifier.application_received(&loan).await {
            tracing::warn!(loan_id = %loan.id, error = %err,
                "Application-received notification failed");
        }

        Ok(loan)
    }

    /// Approve or reject a pending application. A single atomic update: the
    /// rate lookup, total computation and schedule assignment either all
    /// land or none do.
    pub async fn decide(
        &self,
        loan_id: Uuid,
        decision: Decision,
        actor_id: Uuid,
        reason: Option<String>,
    ) -> ApiResult<Loan> {
        let mut tx = self.db_pool.begin().await?;
        self.set_lock_timeout(&mut tx).await?;

        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(loan_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Loan {} not found", loan_id)))?;

        if loan.status != LoanStatus::Pending {
            return Err(ApiError::AlreadyProcessed);
        }

        let now = Utc::now();
        let updated = match decision {
            Decision::Approve => {
                let terms = ApprovalTerms::compute(loan.principal, loan.term_weeks, now)?;

                sqlx::query_as::<_, Loan>(
                    r#"
                    UPDATE loans SET
                        status = $1, interest_rate = $2, total_amount = $3,
                        remaining_amount = $3, approver_id = $4, approved_at = $5,
                        approval_reason = $6, start_date = $7, end_date = $8,
                        updated_at = $5
                    WHERE id = $9
                    RETURNING *
                    "#,
                )
                .bind(LoanStatus::Active)
                .bind(terms.interest_rate)
                .bind(terms.total_amount)
                .bind(actor_id)
                .bind(now)
                .bind(&reason)
                .bind(terms.start_date)
                .bind(terms.end_date)
                .bind(loan_id)
                .fetch_one(&mut *tx)
                .await?
            }
            Decision::Reject => {
                sqlx::query_as::<_, Loan>(
                    r#"
                    UPDATE loans SET
                        status = $1, approver_id = $2, approved_at = $3,
                        approval_reason = $4, updated_at = $3
                    WHERE id = $5
                    RETURNING *
                    "#,
                )
                .bind(LoanStatus::Rejected)
                .bind(actor_id)
                .bind(now)
                .bind(&reason)
                .bind(loan_id)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        tx.commit().await?;

        match decision {
            Decision::Approve => {
                if let Err(err) = self.notifier.loan_approved(&updated).await {
                    tracing::warn!(loan_id = %updated.id, error = %err,
                        "Approval notification failed");
                }
            }
            Decision::Reject => {
                let reason = updated
                    .approval_reason
                    .as_deref()
                    .unwrap_or("We cannot approve your loan application at this time");
                if let Err(err) = self.notifier.loan_rejected(&updated, reason).await {
                    tracing::warn!(loan_id = %updated.id, error = %err,
                        "Rejection notification failed");
                }
            }
        }

        Ok(updated)
    }

    /// Transition an active loan past its due date to overdue. Idempotent:
    /// an already-overdue loan is returned unchanged.
    pub async fn mark_overdue(&self, loan_id: Uuid) -> ApiResult<Loan> {
        let mut tx = self.db_pool.begin().await?;
        self.set_lock_timeout(&mut tx).await?;

        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(loan_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Loan {} not found", loan_id)))?;

        if loan.status == LoanStatus::Overdue {
            tx.commit().await?;
            return Ok(loan);
        }

        if !loan.status.can_transition_to(LoanStatus::Overdue) {
            return Err(ApiError::InvalidLoanState(format!(
                "cannot mark a {} loan overdue",
                loan.status
            )));
        }

        let updated = sqlx::query_as::<_, Loan>(
            "UPDATE loans SET status = $1, updated_at = $2 WHERE id = $3 RETURNING *",
        )
        .bind(LoanStatus::Overdue)
        .bind(Utc::now())
        .bind(loan_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(updated)
    }

    /// Write off an overdue loan as defaulted. An explicit staff decision,
    /// never applied automatically.
    pub async fn mark_defaulted(&self, loan_id: Uuid, actor_id: Uuid) -> ApiResult<Loan> {
        let mut tx = self.db_pool.begin().await?;
        self.set_lock_timeout(&mut tx).await?;

        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(loan_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Loan {} not found", loan_id)))?;

        if !loan.status.can_transition_to(LoanStatus::Defaulted) {
            return Err(ApiError::InvalidLoanState(format!(
                "cannot default a {} loan",
                loan.status
            )));
        }

        let updated = sqlx::query_as::<_, Loan>(
            "UPDATE loans SET status = $1, updated_at = $2 WHERE id = $3 RETURNING *",
        )
        .bind(LoanStatus::Defaulted)
        .bind(Utc::now())
        .bind(loan_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(loan_id = %loan_id, actor_id = %actor_id, "Loan written off as defaulted");

        Ok(updated)
    }

    /// Get loan by ID
    pub async fn get_loan(&self, id: Uuid) -> ApiResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Loan {} not found", id)))
    }

    /// Mark the due-soon reminder as sent. Returns false if another sweep
    /// got there first (or the loan left the active state meanwhile).
    pub async fn mark_reminder_sent(&self, loan_id: Uuid) -> ApiResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE loans SET reminder_sent = TRUE, updated_at = $1
            WHERE id = $2 AND status = 'active' AND reminder_sent = FALSE
            "#,
        )
        .bind(Utc::now())
        .bind(loan_id)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// List loans with filters, newest first
    pub async fn list_loans(&self, query: ListLoansQuery) -> ApiResult<PaginatedResponse<Loan>> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(10).clamp(1, 100);
        let offset = (page - 1) * limit;

        let mut query_builder = sqlx::QueryBuilder::new("SELECT * FROM loans WHERE 1=1");
        let mut count_builder = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM loans WHERE 1=1");

        if let Some(borrower_id) = query.borrower_id {
            query_builder.push(" AND borrower_id = ");
            query_builder.push_bind(borrower_id);
            count_builder.push(" AND borrower_id = ");
            count_builder.push_bind(borrower_id);
        }

        if let Some(status) = query.status {
            query_builder.push(" AND status = ");
            query_builder.push_bind(status);
            count_builder.push(" AND status = ");
            count_builder.push_bind(status);
        }

        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await?;

        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset);

        let loans = query_builder
            .build_query_as::<Loan>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(PaginatedResponse {
            data: loans,
            total,
            page,
            limit,
        })
    }

    async fn set_lock_timeout(&self, tx: &mut sqlx::Transaction<'_, sqlx::Postgres>) -> ApiResult<()> {
        // SET LOCAL does not take bind parameters; the value is a config
        // integer, not caller input.
        let stmt = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout_ms);
        sqlx::query(&stmt).execute(&mut **tx).await?;
        Ok(())
    }
}

fn validate_application(input: &NewLoanApplication) -> ApiResult<()> {
    if input.principal < MIN_PRINCIPAL || input.principal > MAX_PRINCIPAL {
        return Err(ApiError::Validation(format!(
            "Loan amount must be between {} and {}",
            MIN_PRINCIPAL, MAX_PRINCIPAL
        )));
    }
    if !(1..=4).contains(&input.term_weeks) {
        return Err(ApiError::Validation(
            "Loan term must be between 1 and 4 weeks".to_string(),
        ));
    }
    if input.purpose.len() < 3 || input.purpose.len() > 500 {
        return Err(ApiError::Validation(
            "Purpose must be between 3 and 500 characters".to_string(),
        ));
    }
    if input.collateral_refs.is_empty() || input.collateral_refs.len() > 10 {
        return Err(ApiError::Validation(
            "Between 1 and 10 collateral images are required".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn application() -> NewLoanApplication {
        NewLoanApplication {
            borrower_id: Uuid::new_v4(),
            principal: dec!(1000),
            term_weeks: 2,
            purpose: "Working capital".to_string(),
            collateral_refs: vec!["item.jpg".to_string()],
        }
    }

    #[test]
    fn application_bounds_are_enforced() {
        assert!(validate_application(&application()).is_ok());

        let mut low = application();
        low.principal = dec!(199.99);
        assert!(matches!(
            validate_application(&low),
            Err(ApiError::Validation(_))
        ));

        let mut high = application();
        high.principal = dec!(1000000.01);
        assert!(validate_application(&high).is_err());

        let mut term = application();
        term.term_weeks = 0;
        assert!(validate_application(&term).is_err());

        let mut purpose = application();
        purpose.purpose = "ab".to_string();
        assert!(validate_application(&purpose).is_err());

        let mut refs = application();
        refs.collateral_refs.clear();
        assert!(validate_application(&refs).is_err());
    }

    #[test]
    fn principal_bounds_are_inclusive() {
        let mut min = application();
        min.principal = dec!(200);
        assert!(validate_application(&min).is_ok());

        let mut max = application();
        max.principal = dec!(1000000);
        assert!(validate_application(&max).is_ok());
    }
}
