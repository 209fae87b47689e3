//! Dashboard aggregates - read-only projection over the ledger
//!
//! Everything here is computed on demand from the loans and payments
//! tables; nothing is incrementally maintained. "Disbursed" is defined as
//! the principal of loans in {active, completed, defaulted, overdue}:
//! money that actually left the book, whatever happened afterwards.

use chrono::{Datelike, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use crate::error::ApiResult;
use crate::loan::LoanStatus;
use crate::payment::PaymentStatus;

pub const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Loan portfolio counts
#[derive(Debug, Default, Serialize)]
pub struct LoanStats {
    pub total: i64,
    pub pending: i64,
    pub active: i64,
    pub completed: i64,
    pub defaulted: i64,
    pub rejected: i64,
    pub overdue: i64,
    /// Loans approved at some point, whatever their current status
    pub approved: i64,
    /// Applications received in the last 7 days
    pub recent: i64,
    pub approval_rate: Decimal,
    pub average_amount: Decimal,
}

/// Money figures across the portfolio
#[derive(Debug, Default, Serialize)]
pub struct FinancialStats {
    pub total_loaned: Decimal,
    pub total_disbursed: Decimal,
    pub total_repaid: Decimal,
    pub interest_earned: Decimal,
    pub outstanding_amount: Decimal,
    pub collection_rate: Decimal,
}

/// Payment ledger counts
#[derive(Debug, Default, Serialize)]
pub struct PaymentStats {
    pub total: i64,
    pub total_amount: Decimal,
    pub pending: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Current-year monthly time series
#[derive(Debug, Serialize)]
pub struct MonthlySeries {
    pub labels: [&'static str; 12],
    pub loans: Vec<i64>,
    pub disbursed: Vec<Decimal>,
    pub collections: Vec<Decimal>,
}

/// Full dashboard payload
#[derive(Debug, Serialize)]
pub struct AggregateStats {
    pub loans: LoanStats,
    pub financial: FinancialStats,
    pub payments: PaymentStats,
    pub monthly: MonthlySeries,
}

/// Dashboard service computing aggregates on demand
pub struct DashboardService {
    db_pool: PgPool,
}

impl DashboardService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn summary(&self) -> ApiResult<AggregateStats> {
        let now = Utc::now();

        let mut loans = LoanStats::default();
        let status_counts: Vec<(LoanStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM loans GROUP BY status")
                .fetch_all(&self.db_pool)
                .await?;

        for (status, count) in status_counts {
            loans.total += count;
            match status {
                LoanStatus::Pending => loans.pending = count,
                LoanStatus::Approved => loans.approved += count,
                LoanStatus::Rejected => loans.rejected = count,
                LoanStatus::Active => loans.active = count,
                LoanStatus::Completed => loans.completed = count,
                LoanStatus::Defaulted => loans.defaulted = count,
                LoanStatus::Overdue => loans.overdue = count,
            }
        }
        // Cumulative approvals: every loan that made it past pending review
        loans.approved += loans.active + loans.completed + loans.defaulted + loans.overdue;

        loans.recent = sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE created_at >= $1")
            .bind(now - Duration::days(7))
            .fetch_one(&self.db_pool)
            .await?;

        let disbursed: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(principal), 0) FROM loans
            WHERE status IN ('active', 'completed', 'defaulted', 'overdue')
            "#,
        )
        .fetch_one(&self.db_pool)
        .await?;

        let total_with_interest: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(total_amount), 0) FROM loans WHERE total_amount IS NOT NULL",
        )
        .fetch_one(&self.db_pool)
        .await?;

        let mut payments = PaymentStats::default();
        let payment_rows: Vec<(PaymentStatus, i64, Decimal)> = sqlx::query_as(
            "SELECT status, COUNT(*), COALESCE(SUM(amount), 0) FROM payments GROUP BY status",
        )
        .fetch_all(&self.db_pool)
        .await?;

        let mut repaid = Decimal::ZERO;
        for (status, count, amount) in payment_rows {
            payments.total += count;
            payments.total_amount += amount;
            match status {
                PaymentStatus::Pending => payments.pending = count,
                PaymentStatus::Completed => {
                    payments.completed = count;
                    repaid = amount;
                }
                PaymentStatus::Failed => payments.failed = count,
            }
        }

        loans.approval_rate = approval_rate(loans.approved, loans.rejected);
        loans.average_amount = average_amount(disbursed, loans.total);

        let financial = FinancialStats {
            total_loaned: disbursed,
            total_disbursed: disbursed,
            total_repaid: repaid,
            interest_earned: total_with_interest - disbursed,
            outstanding_amount: disbursed - repaid,
            collection_rate: collection_rate(repaid, disbursed),
        };

        let monthly = self.monthly_series(now.year()).await?;

        Ok(AggregateStats {
            loans,
            financial,
            payments,
            monthly,
        })
    }

    async fn monthly_series(&self, year: i32) -> ApiResult<MonthlySeries> {
        let year_start = Utc
            .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);

        let loan_rows: Vec<(i32, i64)> = sqlx::query_as(
            r#"
            SELECT CAST(EXTRACT(MONTH FROM created_at) AS INT), COUNT(*)
            FROM loans WHERE created_at >= $1 GROUP BY 1
            "#,
        )
        .bind(year_start)
        .fetch_all(&self.db_pool)
        .await?;

        let disbursed_rows: Vec<(i32, Decimal)> = sqlx::query_as(
            r#"
            SELECT CAST(EXTRACT(MONTH FROM created_at) AS INT), COALESCE(SUM(principal), 0)
            FROM loans
            WHERE created_at >= $1
              AND status IN ('active', 'completed', 'defaulted', 'overdue')
            GROUP BY 1
            "#,
        )
        .bind(year_start)
        .fetch_all(&self.db_pool)
        .await?;

        let collection_rows: Vec<(i32, Decimal)> = sqlx::query_as(
            r#"
            SELECT CAST(EXTRACT(MONTH FROM payment_date) AS INT), COALESCE(SUM(amount), 0)
            FROM payments
            WHERE payment_date >= $1 AND status = 'completed'
            GROUP BY 1
            "#,
        )
        .bind(year_start)
        .fetch_all(&self.db_pool)
        .await?;

        let mut loans = vec![0i64; 12];
        for (month, count) in loan_rows {
            if let Some(slot) = loans.get_mut((month - 1) as usize) {
                *slot = count;
            }
        }

        let mut disbursed = vec![Decimal::ZERO; 12];
        for (month, amount) in disbursed_rows {
            if let Some(slot) = disbursed.get_mut((month - 1) as usize) {
                *slot = amount;
            }
        }

        let mut collections = vec![Decimal::ZERO; 12];
        for (month, amount) in collection_rows {
            if let Some(slot) = collections.get_mut((month - 1) as usize) {
                *slot = amount;
            }
        }

        Ok(MonthlySeries {
            labels: MONTH_LABELS,
            loans,
            disbursed,
            collections,
        })
    }
}

/// Share of processed applications that were approved, in percent.
fn approval_rate(approved: i64, rejected: i64) -> Decimal {
    let processed = approved + rejected;
    if processed == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(approved) * Decimal::ONE_HUNDRED / Decimal::from(processed)).round_dp(2)
}

/// Repayments collected as a share of money disbursed, in percent.
fn collection_rate(repaid: Decimal, disbursed: Decimal) -> Decimal {
    if disbursed <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (repaid * Decimal::ONE_HUNDRED / disbursed).round_dp(2)
}

fn average_amount(loaned: Decimal, total_loans: i64) -> Decimal {
    if total_loans == 0 {
        return Decimal::ZERO;
    }
    (loaned / Decimal::from(total_loans)).round_dp(2)
}
