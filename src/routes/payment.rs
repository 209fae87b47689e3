//! Payment route definitions

use axum::{routing::get, routing::post, Router};

use crate::handlers::{list_loan_payments, record_payment};
use crate::state::AppState;

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/api/loans/:id/payments", post(record_payment))
        .route("/api/loans/:id/payments", get(list_loan_payments))
}
