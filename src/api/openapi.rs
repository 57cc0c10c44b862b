//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, health, items, loans, patrons, reports, stats};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library Ledger API",
        version = "1.0.0",
        description = "Library inventory and loan desk REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::me,
        // Catalog
        items::list_items,
        items::create_item,
        items::get_item_by_barcode,
        items::item_loans,
        items::create_author,
        items::create_publisher,
        items::list_authors,
        items::list_publishers,
        // Patrons
        patrons::list_patrons,
        patrons::create_patron,
        patrons::get_patron_by_barcode,
        patrons::patron_loans,
        // Loans
        loans::issue_item,
        loans::return_item,
        loans::active_loans,
        loans::loan_history,
        // Stats and reports
        stats::dashboard_stats,
        reports::loan_history_report,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            auth::StaffInfo,
            crate::models::staff::StaffRole,
            // Catalog
            items::ItemPage,
            crate::models::item::Item,
            crate::models::item::ItemKind,
            crate::models::item::ItemShort,
            crate::models::item::CreateItem,
            crate::models::author::Author,
            crate::models::author::AuthorShort,
            crate::models::author::CreateAuthor,
            crate::models::author::Publisher,
            crate::models::author::PublisherShort,
            crate::models::author::CreatePublisher,
            // Patrons
            patrons::PatronPage,
            crate::models::patron::Patron,
            crate::models::patron::PatronShort,
            crate::models::patron::CreatePatron,
            // Loans
            loans::IssueRequest,
            loans::IssueResponse,
            loans::ReturnRequest,
            crate::models::loan::LoanStatus,
            crate::models::loan::LoanDetails,
            crate::models::loan::ReturnReceipt,
            // Stats and reports
            stats::DashboardStats,
            reports::ReportSummary,
            reports::LoanHistoryReport,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
            crate::error::HolderDetails,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Staff authentication"),
        (name = "items", description = "Catalog items, authors and publishers"),
        (name = "patrons", description = "Patron registry"),
        (name = "loans", description = "Issue, return and loan queries"),
        (name = "stats", description = "Dashboard statistics"),
        (name = "reports", description = "Reports")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
