//! Admin route definitions

use axum::{routing::get, routing::post, Router};

use crate::handlers::{dashboard, decide_loan, default_loan, run_reconciliation};
use crate::state::AppState;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/loans/:id/decision", post(decide_loan))
        .route("/api/admin/loans/:id/default", post(default_loan))
        .route("/api/admin/dashboard", get(dashboard))
        .route("/api/admin/reconciliation", post(run_reconciliation))
}
