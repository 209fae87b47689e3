//! Loan lifecycle integration tests
//!
//! These exercise the full application -> decision -> repayment flow
//! against a real PostgreSQL database. Run with:
//!   TEST_DATABASE_URL=postgresql://localhost/quickcash_test cargo test -- --ignored

use std::sync::Arc;

use rust_decimal_macros::dec;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use quickcash_backend::error::ApiError;
use quickcash_backend::loan::{Decision, LoanStatus, NewLoanApplication};
use quickcash_backend::loan_service::LoanService;
use quickcash_backend::notifier::LogNotifier;
use quickcash_backend::payment_service::{PaymentInput, PaymentService};

/// Helper to create a test database pool
async fn setup_test_db() -> PgPool {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/quickcash_test".to_string());

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

fn loan_service(pool: &PgPool) -> Arc<LoanService> {
    Arc::new(LoanService::new(pool.clone(), Arc::new(LogNotifier), 2000))
}

fn payment_service(pool: &PgPool) -> Arc<PaymentService> {
    Arc::new(PaymentService::new(pool.clone(), 2000))
}

fn application(borrower_id: Uuid) -> NewLoanApplication {
    NewLoanApplication {
        borrower_id,
        principal: dec!(1000),
        term_weeks: 2,
        purpose: "Working capital for market stall".to_string(),
        collateral_refs: vec!["collateral_1.jpg".to_string()],
    }
}

fn payment(amount: rust_decimal::Decimal) -> PaymentInput {
    PaymentInput {
        amount,
        method: "mobile_money".to_string(),
        notes: None,
    }
}

#[tokio::test]
#[ignore] // Requires database setup
async fn full_lifecycle_application_to_completion() {
    let pool = setup_test_db().await;
    let loans = loan_service(&pool);
    let payments = payment_service(&pool);

    let borrower = Uuid::new_v4();
    let admin = Uuid::new_v4();

    // Submit: pending, no financial terms yet
    let loan = loans.submit_application(application(borrower)).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Pending);
    assert_eq!(loan.paid_amount, dec!(0));
    assert!(loan.interest_rate.is_none());
    assert!(loan.total_amount.is_none());
    assert!(loan.loan_number.starts_with("LN-"));

    // Approve: 1000 at 2 weeks -> 25% -> 1250.00 total
    let loan = loans
        .decide(loan.id, Decision::Approve, admin, None)
        .await
        .unwrap();
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(loan.interest_rate, Some(dec!(0.25)));
    assert_eq!(loan.total_amount, Some(dec!(1250.00)));
    assert_eq!(loan.remaining_amount, Some(dec!(1250.00)));
    assert_eq!(loan.approver_id, Some(admin));
    assert!(loan.start_date.is_some());
    let start = loan.start_date.unwrap();
    let end = loan.end_date.unwrap();
    assert_eq!(end - start, chrono::Duration::days(14));

    // Pay off in one call
    let result = payments
        .apply_payment(loan.id, payment(dec!(1250.00)), borrower)
        .await
        .unwrap();
    assert!(result.is_loan_completed);
    assert_eq!(result.remaining_balance, dec!(0));

    let loan = loans.get_loan(loan.id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Completed);
    assert_eq!(loan.paid_amount, dec!(1250.00));
    assert_eq!(loan.remaining_amount, Some(dec!(0.00)));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn second_application_is_rejected_while_first_is_unsettled() {
    let pool = setup_test_db().await;
    let loans = loan_service(&pool);

    let borrower = Uuid::new_v4();

    loans.submit_application(application(borrower)).await.unwrap();

    let err = loans
        .submit_application(application(borrower))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::DuplicateActiveLoan));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn concurrent_applications_admit_exactly_one() {
    let pool = setup_test_db().await;
    let loans = loan_service(&pool);

    let borrower = Uuid::new_v4();

    let first = loans.submit_application(application(borrower));
    let second = loans.submit_application(application(borrower));
    let (first, second) = tokio::join!(first, second);

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one submission may win the race");

    let loser = if first.is_err() { first } else { second };
    assert!(matches!(loser.unwrap_err(), ApiError::DuplicateActiveLoan));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn settled_borrower_may_apply_again() {
    let pool = setup_test_db().await;
    let loans = loan_service(&pool);

    let borrower = Uuid::new_v4();
    let admin = Uuid::new_v4();

    let loan = loans.submit_application(application(borrower)).await.unwrap();
    loans
        .decide(loan.id, Decision::Reject, admin, Some("No capacity".to_string()))
        .await
        .unwrap();

    // Rejected is settled; a fresh application goes through
    let second = loans.submit_application(application(borrower)).await.unwrap();
    assert_eq!(second.status, LoanStatus::Pending);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn decide_twice_fails_with_already_processed() {
    let pool = setup_test_db().await;
    let loans = loan_service(&pool);

    let admin = Uuid::new_v4();
    let loan = loans
        .submit_application(application(Uuid::new_v4()))
        .await
        .unwrap();

    loans
        .decide(loan.id, Decision::Approve, admin, None)
        .await
        .unwrap();

    for decision in [Decision::Approve, Decision::Reject] {
        let err = loans
            .decide(loan.id, decision, admin, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AlreadyProcessed));
    }
}

#[tokio::test]
#[ignore] // Requires database setup
async fn rejection_records_reason_and_leaves_ledger_empty() {
    let pool = setup_test_db().await;
    let loans = loan_service(&pool);

    let admin = Uuid::new_v4();
    let loan = loans
        .submit_application(application(Uuid::new_v4()))
        .await
        .unwrap();

    let loan = loans
        .decide(
            loan.id,
            Decision::Reject,
            admin,
            Some("Insufficient collateral".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(loan.status, LoanStatus::Rejected);
    assert_eq!(loan.approval_reason.as_deref(), Some("Insufficient collateral"));
    assert_eq!(loan.approver_id, Some(admin));
    assert!(loan.total_amount.is_none());
    assert!(loan.start_date.is_none());
    assert!(loan.end_date.is_none());
}

#[tokio::test]
#[ignore] // Requires database setup
async fn overpayment_is_rejected_and_changes_nothing() {
    let pool = setup_test_db().await;
    let loans = loan_service(&pool);
    let payments = payment_service(&pool);

    let borrower = Uuid::new_v4();
    let admin = Uuid::new_v4();

    let loan = loans.submit_application(application(borrower)).await.unwrap();
    let loan = loans
        .decide(loan.id, Decision::Approve, admin, None)
        .await
        .unwrap();

    let err = payments
        .apply_payment(loan.id, payment(dec!(1250.01)), borrower)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Overpayment));

    let loan = loans.get_loan(loan.id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(loan.paid_amount, dec!(0));
    assert_eq!(loan.remaining_amount, Some(dec!(1250.00)));

    let recorded = payments.list_payments(loan.id).await.unwrap();
    assert!(recorded.is_empty(), "failed attempt must not leave a payment row");
}

#[tokio::test]
#[ignore] // Requires database setup
async fn payments_are_refused_outside_active_and_overdue() {
    let pool = setup_test_db().await;
    let loans = loan_service(&pool);
    let payments = payment_service(&pool);

    let borrower = Uuid::new_v4();

    let loan = loans.submit_application(application(borrower)).await.unwrap();

    let err = payments
        .apply_payment(loan.id, payment(dec!(100)), borrower)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidLoanState(_)));

    let err = payments
        .apply_payment(Uuid::new_v4(), payment(dec!(100)), borrower)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn paid_amount_matches_sum_of_completed_payments() {
    let pool = setup_test_db().await;
    let loans = loan_service(&pool);
    let payments = payment_service(&pool);

    let borrower = Uuid::new_v4();
    let admin = Uuid::new_v4();

    let loan = loans.submit_application(application(borrower)).await.unwrap();
    let loan = loans
        .decide(loan.id, Decision::Approve, admin, None)
        .await
        .unwrap();

    for amount in [dec!(400), dec!(350.50), dec!(499.50)] {
        payments
            .apply_payment(loan.id, payment(amount), borrower)
            .await
            .unwrap();
    }

    let loan = loans.get_loan(loan.id).await.unwrap();
    let recorded = payments.list_payments(loan.id).await.unwrap();
    let sum: rust_decimal::Decimal = recorded.iter().map(|p| p.amount).sum();

    assert_eq!(loan.paid_amount, sum);
    assert_eq!(loan.paid_amount, dec!(1250.00));
    assert_eq!(loan.status, LoanStatus::Completed);
    assert_eq!(
        loan.total_amount.unwrap() - loan.paid_amount,
        loan.remaining_amount.unwrap()
    );
}
