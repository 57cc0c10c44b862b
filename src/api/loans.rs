//! Loan desk endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::AppResult,
    models::loan::{LoanDetails, LoanHistoryQuery, ReturnReceipt},
};

use super::{ApiQuery, AuthenticatedStaff, ValidatedJson};

/// Issue request
#[derive(Deserialize, Validate, ToSchema)]
pub struct IssueRequest {
    #[validate(length(min = 1, message = "item_barcode must not be empty"))]
    pub item_barcode: String,
    #[validate(length(min = 1, message = "patron_barcode must not be empty"))]
    pub patron_barcode: String,
}

/// Issue response with the new loan
#[derive(Serialize, ToSchema)]
pub struct IssueResponse {
    /// Status message
    pub message: String,
    pub loan: LoanDetails,
}

/// Return request
#[derive(Deserialize, Validate, ToSchema)]
pub struct ReturnRequest {
    #[validate(length(min = 1, message = "item_barcode must not be empty"))]
    pub item_barcode: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActiveLoansQuery {
    /// Substring of item title or barcode, or patron name or barcode
    pub search: Option<String>,
}

/// Issue an item to a patron
#[utoipa::path(
    post,
    path = "/loans/issue",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = IssueRequest,
    responses(
        (status = 201, description = "Item issued", body = IssueResponse),
        (status = 400, description = "Item already on loan; details name the holder", body = crate::error::ErrorResponse),
        (status = 404, description = "Item or patron not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Concurrent issue of the same item", body = crate::error::ErrorResponse)
    )
)]
pub async fn issue_item(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(claims): AuthenticatedStaff,
    ValidatedJson(request): ValidatedJson<IssueRequest>,
) -> AppResult<(StatusCode, Json<IssueResponse>)> {
    let loan = state
        .services
        .availability
        .issue(&request.item_barcode, &request.patron_barcode, claims.staff_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(IssueResponse {
            message: format!("Issued {} to {}", loan.item.title, loan.patron.display_name),
            loan,
        }),
    ))
}

/// Return an item
#[utoipa::path(
    post,
    path = "/loans/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = ReturnRequest,
    responses(
        (status = 200, description = "Item returned", body = ReturnReceipt),
        (status = 404, description = "Item not found or not on loan", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_item(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(claims): AuthenticatedStaff,
    ValidatedJson(request): ValidatedJson<ReturnRequest>,
) -> AppResult<Json<ReturnReceipt>> {
    let receipt = state
        .services
        .availability
        .return_item(&request.item_barcode, claims.staff_id)
        .await?;
    Ok(Json(receipt))
}

/// List open loans
#[utoipa::path(
    get,
    path = "/loans/active",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(ActiveLoansQuery),
    responses(
        (status = 200, description = "Open loans, newest first", body = Vec<LoanDetails>)
    )
)]
pub async fn active_loans(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(_claims): AuthenticatedStaff,
    ApiQuery(query): ApiQuery<ActiveLoansQuery>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.ledger.active_loans(query.search.as_deref()).await?;
    Ok(Json(loans))
}

/// Filtered loan history
#[utoipa::path(
    get,
    path = "/loans/history",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanHistoryQuery),
    responses(
        (status = 200, description = "Matching loans, newest first", body = Vec<LoanDetails>),
        (status = 400, description = "Invalid filter", body = crate::error::ErrorResponse)
    )
)]
pub async fn loan_history(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(_claims): AuthenticatedStaff,
    ApiQuery(query): ApiQuery<LoanHistoryQuery>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.ledger.history(&query.to_filter()?).await?;
    Ok(Json(loans))
}
