//! Loan application and retrieval handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiResult;
use crate::loan::{CreateLoanRequest, ListLoansQuery, Loan, NewLoanApplication};
use crate::middleware::ActorContext;
use crate::models::{ApiResponse, PaginatedResponse};
use crate::state::AppState;
use crate::storage;

/// Submit a loan application. Collateral images arrive as base64 data
/// URLs, are stored through the image store, and only their filename
/// references reach the loan core. A failed application cleans up any
/// files stored before the failure.
pub async fn create_loan(
    State(state): State<AppState>,
    actor: ActorContext,
    Json(request): Json<CreateLoanRequest>,
) -> ApiResult<impl IntoResponse> {
    request.validate()?;

    let mut stored: Vec<String> = Vec::new();
    for data_url in &request.collateral_images {
        let image = match storage::decode_data_url(data_url) {
            Ok(image) => image,
            Err(err) => {
                cleanup_images(&state, &stored).await;
                return Err(err);
            }
        };

        match state.image_store.store(&image, actor.actor_id).await {
            Ok(filename) => stored.push(filename),
            Err(err) => {
                cleanup_images(&state, &stored).await;
                return Err(err);
            }
        }
    }

    let application = NewLoanApplication {
        borrower_id: actor.actor_id,
        principal: request.principal,
        term_weeks: request.term_weeks,
        purpose: request.purpose,
        collateral_refs: stored.clone(),
    };

    match state.loan_service.submit_application(application).await {
        Ok(loan) => Ok((StatusCode::CREATED, Json(ApiResponse::ok(loan)))),
        Err(err) => {
            cleanup_images(&state, &stored).await;
            Err(err)
        }
    }
}

/// Fetch a single loan. Ownership scoping is the caller's concern; the
/// actor only has to be present.
pub async fn get_loan(
    State(state): State<AppState>,
    _actor: ActorContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    let loan = state.loan_service.get_loan(id).await?;

    Ok(Json(ApiResponse::ok(loan)))
}

/// List loans with optional borrower/status filters
pub async fn list_loans(
    State(state): State<AppState>,
    _actor: ActorContext,
    Query(query): Query<ListLoansQuery>,
) -> ApiResult<Json<ApiResponse<PaginatedResponse<Loan>>>> {
    let page = state.loan_service.list_loans(query).await?;

    Ok(Json(ApiResponse::ok(page)))
}

/// Serve a stored collateral image by its opaque reference
pub async fn get_collateral_image(
    State(state): State<AppState>,
    _actor: ActorContext,
    Path(filename): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let (bytes, content_type) = state.image_store.load(&filename).await?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=31536000"),
        ],
        bytes,
    ))
}

async fn cleanup_images(state: &AppState, stored: &[String]) {
    for filename in stored {
        state.image_store.remove(filename).await;
    }
}
