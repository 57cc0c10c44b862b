//! Report endpoints

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::loan::{LoanDetails, LoanHistoryQuery},
};

use super::{ApiQuery, AuthenticatedStaff};

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportSummary {
    pub total: i64,
    pub open: i64,
    pub closed: i64,
}

/// Loan history report
#[derive(Debug, Serialize, ToSchema)]
pub struct LoanHistoryReport {
    pub summary: ReportSummary,
    /// Matching loans, newest first
    pub loans: Vec<LoanDetails>,
}

/// Loan history report over an inclusive date range
#[utoipa::path(
    get,
    path = "/reports/loan-history",
    tag = "reports",
    security(("bearer_auth" = [])),
    params(LoanHistoryQuery),
    responses(
        (status = 200, description = "Report", body = LoanHistoryReport),
        (status = 400, description = "Invalid filter", body = crate::error::ErrorResponse)
    )
)]
pub async fn loan_history_report(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(_claims): AuthenticatedStaff,
    ApiQuery(query): ApiQuery<LoanHistoryQuery>,
) -> AppResult<Json<LoanHistoryReport>> {
    let report = state.services.stats.loan_history_report(&query).await?;
    Ok(Json(report))
}
