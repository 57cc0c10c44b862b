//! Dashboard statistics endpoint

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppResult;

use super::AuthenticatedStaff;

/// Dashboard counters
#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardStats {
    /// Items in the catalog
    pub total_items: i64,
    /// Items without an open loan
    pub available_items: i64,
    /// Registered patrons
    pub total_patrons: i64,
    /// Open loans
    pub active_loans: i64,
    /// Loans issued during the current local calendar day
    pub today_issued: i64,
    /// Loans returned during the current local calendar day
    pub today_returned: i64,
    /// Open loans issued more than 30 days ago
    pub overdue_loans: i64,
}

/// Get dashboard statistics
#[utoipa::path(
    get,
    path = "/dashboard/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Dashboard counters", body = DashboardStats),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn dashboard_stats(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(_claims): AuthenticatedStaff,
) -> AppResult<Json<DashboardStats>> {
    let stats = state.services.stats.dashboard().await?;
    Ok(Json(stats))
}
