//! Repayment handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiResult;
use crate::middleware::ActorContext;
use crate::models::ApiResponse;
use crate::payment::{Payment, PaymentResult, RecordPaymentRequest};
use crate::payment_service::PaymentInput;
use crate::state::AppState;

/// Apply a repayment against a loan
pub async fn record_payment(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(loan_id): Path<Uuid>,
    Json(request): Json<RecordPaymentRequest>,
) -> ApiResult<impl IntoResponse> {
    request.validate()?;

    let input = PaymentInput {
        amount: request.amount,
        method: request.method,
        notes: request.notes,
    };

    let result: PaymentResult = state
        .payment_service
        .apply_payment(loan_id, input, actor.actor_id)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(result))))
}

/// List the payments recorded against a loan, newest first
pub async fn list_loan_payments(
    State(state): State<AppState>,
    _actor: ActorContext,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<Payment>>>> {
    // 404 on an unknown loan rather than an empty list
    state.loan_service.get_loan(loan_id).await?;

    let payments = state.payment_service.list_payments(loan_id).await?;

    Ok(Json(ApiResponse::ok(payments)))
}
