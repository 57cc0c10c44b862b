//! Patron registry endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        loan::LoanDetails,
        patron::{CreatePatron, Patron, PatronQuery},
    },
};

use super::{ApiQuery, AuthenticatedStaff, ValidatedJson};

/// One page of patron search results
#[derive(Serialize, ToSchema)]
pub struct PatronPage {
    pub patrons: Vec<Patron>,
    /// Total number of matching patrons
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

/// Search patrons with pagination, ordered by name
#[utoipa::path(
    get,
    path = "/patrons",
    tag = "patrons",
    security(("bearer_auth" = [])),
    params(PatronQuery),
    responses(
        (status = 200, description = "Matching patrons", body = PatronPage),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_patrons(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(_claims): AuthenticatedStaff,
    ApiQuery(query): ApiQuery<PatronQuery>,
) -> AppResult<Json<PatronPage>> {
    let (patrons, total) = state.services.patrons.search_patrons(&query).await?;
    let (page, per_page, _) = query.pagination();

    Ok(Json(PatronPage {
        patrons,
        total,
        page,
        per_page,
    }))
}

/// Register a patron
#[utoipa::path(
    post,
    path = "/patrons",
    tag = "patrons",
    security(("bearer_auth" = [])),
    request_body = CreatePatron,
    responses(
        (status = 201, description = "Patron created", body = Patron),
        (status = 400, description = "Invalid data", body = crate::error::ErrorResponse),
        (status = 409, description = "Barcode already in use", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_patron(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(claims): AuthenticatedStaff,
    ValidatedJson(patron): ValidatedJson<CreatePatron>,
) -> AppResult<(StatusCode, Json<Patron>)> {
    let created = state.services.patrons.create_patron(patron, claims.staff_id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Get a patron by barcode, with active loan count
#[utoipa::path(
    get,
    path = "/patrons/barcode/{barcode}",
    tag = "patrons",
    security(("bearer_auth" = [])),
    params(
        ("barcode" = String, Path, description = "Patron barcode, matched exactly")
    ),
    responses(
        (status = 200, description = "Patron details", body = Patron),
        (status = 404, description = "Patron not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_patron_by_barcode(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(_claims): AuthenticatedStaff,
    Path(barcode): Path<String>,
) -> AppResult<Json<Patron>> {
    let patron = state.services.patrons.get_by_barcode(&barcode).await?;
    Ok(Json(patron))
}

/// Loan history of a patron
#[utoipa::path(
    get,
    path = "/patrons/{id}/loans",
    tag = "patrons",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Patron ID")
    ),
    responses(
        (status = 200, description = "Loans of the patron, newest first", body = Vec<LoanDetails>),
        (status = 404, description = "Patron not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn patron_loans(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(_claims): AuthenticatedStaff,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.patrons.patron_loans(id).await?;
    Ok(Json(loans))
}
