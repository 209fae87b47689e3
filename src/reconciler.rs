//! Daily reconciliation sweeps
//!
//! Two calendar-driven sweeps over active loans: a due-soon reminder a
//! configurable number of days before the end date, and an overdue
//! transition a configurable number of days after it. A failure on one
//! loan never aborts the batch; the report carries the counts.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::loan::Loan;
use crate::loan_service::LoanService;
use crate::notifier::Notifier;

/// Outcome of one reconciliation run
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub reminders_sent: u32,
    pub overdue_marked: u32,
    pub failures: u32,
}

/// Scheduled reconciler over the loans table
pub struct Reconciler {
    db_pool: PgPool,
    loans: Arc<LoanService>,
    notifier: Arc<dyn Notifier>,
    reminder_lead_days: i64,
    overdue_grace_days: i64,
}

impl Reconciler {
    pub fn new(
        db_pool: PgPool,
        loans: Arc<LoanService>,
        notifier: Arc<dyn Notifier>,
        reminder_lead_days: i64,
        overdue_grace_days: i64,
    ) -> Self {
        Self {
            db_pool,
            loans,
            notifier,
            reminder_lead_days,
            overdue_grace_days,
        }
    }

    /// Run both sweeps against the current clock.
    pub async fn run_daily(&self) -> ReconciliationReport {
        self.run_at(Utc::now()).await
    }

    /// Run both sweeps as of `now`. Split out so tests can pin the clock.
    pub async fn run_at(&self, now: DateTime<Utc>) -> ReconciliationReport {
        let mut report = ReconciliationReport::default();

        self.sweep_overdue(now, &mut report).await;
        self.sweep_reminders(now, &mut report).await;

        tracing::info!(
            reminders_sent = report.reminders_sent,
            overdue_marked = report.overdue_marked,
            failures = report.failures,
            "Reconciliation run complete"
        );

        report
    }

    /// Mark loans overdue whose end date fell `overdue_grace_days` ago.
    async fn sweep_overdue(&self, now: DateTime<Utc>, report: &mut ReconciliationReport) {
        let (start, end) = day_window(now, -self.overdue_grace_days);

        let due = match self.active_loans_ending_between(start, end, false).await {
            Ok(loans) => loans,
            Err(err) => {
                tracing::error!(error = %err, "Overdue sweep query failed");
                report.failures += 1;
                return;
            }
        };

        for loan in due {
            match self.loans.mark_overdue(loan.id).await {
                Ok(_) => report.overdue_marked += 1,
                Err(err) => {
                    tracing::warn!(loan_id = %loan.id, error = %err,
                        "Failed to mark loan overdue");
                    report.failures += 1;
                }
            }
        }
    }

    /// Remind borrowers whose loans fall due in `reminder_lead_days`.
    async fn sweep_reminders(&self, now: DateTime<Utc>, report: &mut ReconciliationReport) {
        let (start, end) = day_window(now, self.reminder_lead_days);

        let due_soon = match self.active_loans_ending_between(start, end, true).await {
            Ok(loans) => loans,
            Err(err) => {
                tracing::error!(error = %err, "Reminder sweep query failed");
                report.failures += 1;
                return;
            }
        };

        for loan in due_soon {
            if let Err(err) = self.notifier.payment_due_soon(&loan).await {
                tracing::warn!(loan_id = %loan.id, error = %err,
                    "Due-soon reminder delivery failed");
                report.failures += 1;
                continue;
            }

            match self.loans.mark_reminder_sent(loan.id).await {
                // false: another run latched the flag first; the borrower
                // was still reminded only once, so nothing to count.
                Ok(true) => report.reminders_sent += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(loan_id = %loan.id, error = %err,
                        "Failed to latch reminder flag");
                    report.failures += 1;
                }
            }
        }
    }

    async fn active_loans_ending_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        unreminded_only: bool,
    ) -> Result<Vec<Loan>, sqlx::Error> {
        let mut builder = sqlx::QueryBuilder::new(
            "SELECT * FROM loans WHERE status = 'active' AND end_date BETWEEN ",
        );
        builder.push_bind(start);
        builder.push(" AND ");
        builder.push_bind(end);
        if unreminded_only {
            builder.push(" AND reminder_sent = FALSE");
        }

        builder.build_query_as::<Loan>().fetch_all(&self.db_pool).await
    }
}

/// The whole calendar day `offset_days` from `now`, as an inclusive
/// [start-of-day, end-of-day] UTC range.
pub fn day_window(now: DateTime<Utc>, offset_days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let date = (now + Duration::days(offset_days)).date_naive();
    let start = date.and_time(NaiveTime::MIN).and_utc();
    let end = start + Duration::days(1) - Duration::milliseconds(1);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_window_covers_the_target_day() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 14, 30, 0).unwrap();

        let (start, end) = day_window(now, 2);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 12, 0, 0, 0).unwrap());
        assert_eq!(
            end,
            Utc.with_ymd_and_hms(2025, 3, 12, 23, 59, 59).unwrap() + Duration::milliseconds(999)
        );
    }

    #[test]
    fn day_window_negative_offset_looks_back() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();

        let (start, end) = day_window(now, -3);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 7, 0, 0, 0).unwrap());
        assert!(end < Utc.with_ymd_and_hms(2025, 3, 8, 0, 0, 0).unwrap());
    }

    #[test]
    fn day_window_crosses_month_boundaries() {
        let now = Utc.with_ymd_and_hms(2025, 1, 30, 12, 0, 0).unwrap();

        let (start, _) = day_window(now, 2);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());
    }
}
