//! Staff and administrator handlers

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::analytics::AggregateStats;
use crate::error::ApiResult;
use crate::loan::{DecisionRequest, Loan};
use crate::middleware::AdminActor;
use crate::models::ApiResponse;
use crate::reconciler::ReconciliationReport;
use crate::state::AppState;

/// Approve or reject a pending application
pub async fn decide_loan(
    State(state): State<AppState>,
    AdminActor(actor): AdminActor,
    Path(id): Path<Uuid>,
    Json(request): Json<DecisionRequest>,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    let loan = state
        .loan_service
        .decide(id, request.decision, actor.actor_id, request.reason)
        .await?;

    Ok(Json(ApiResponse::ok(loan)))
}

/// Write off an overdue loan as defaulted
pub async fn default_loan(
    State(state): State<AppState>,
    AdminActor(actor): AdminActor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    let loan = state
        .loan_service
        .mark_defaulted(id, actor.actor_id)
        .await?;

    Ok(Json(ApiResponse::ok(loan)))
}

/// Portfolio-wide aggregate statistics
pub async fn dashboard(
    State(state): State<AppState>,
    _actor: AdminActor,
) -> ApiResult<Json<ApiResponse<AggregateStats>>> {
    let stats = state.dashboard_service.summary().await?;

    Ok(Json(ApiResponse::ok(stats)))
}

/// Trigger the daily reconciliation sweeps out of schedule
pub async fn run_reconciliation(
    State(state): State<AppState>,
    _actor: AdminActor,
) -> Json<ApiResponse<ReconciliationReport>> {
    let report = state.reconciler.run_daily().await;

    Json(ApiResponse::ok(report))
}
