//! Loan route definitions

use axum::{routing::get, routing::post, Router};

use crate::handlers::{create_loan, get_collateral_image, get_loan, list_loans};
use crate::state::AppState;

pub fn loan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/loans", post(create_loan))
        .route("/api/loans", get(list_loans))
        .route("/api/loans/collateral/:filename", get(get_collateral_image))
        .route("/api/loans/:id", get(get_loan))
}
