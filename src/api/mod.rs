//! API handlers for the library REST endpoints

pub mod auth;
pub mod health;
pub mod items;
pub mod loans;
pub mod openapi;
pub mod patrons;
pub mod reports;
pub mod stats;

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use validator::Validate;

use crate::{error::AppError, models::staff::StaffClaims, AppState};

/// Extractor for authenticated staff from JWT token
pub struct AuthenticatedStaff(pub StaffClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedStaff {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // Get the Authorization header
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = state.services.auth.verify_token(token)?;

        Ok(AuthenticatedStaff(claims))
    }
}

/// JSON body that is deserialized and validated, failing with `Validation`
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| AppError::Validation(rejection.body_text()))?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// Query string extractor whose rejection is a `Validation` error
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: QueryRejection| AppError::Validation(rejection.body_text()))?;
        Ok(ApiQuery(value))
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        // Catalog
        .route("/items", get(items::list_items).post(items::create_item))
        .route("/items/barcode/:barcode", get(items::get_item_by_barcode))
        .route("/items/:id/loans", get(items::item_loans))
        .route("/authors", get(items::list_authors).post(items::create_author))
        .route("/publishers", get(items::list_publishers).post(items::create_publisher))
        // Patrons
        .route("/patrons", get(patrons::list_patrons).post(patrons::create_patron))
        .route("/patrons/barcode/:barcode", get(patrons::get_patron_by_barcode))
        .route("/patrons/:id/loans", get(patrons::patron_loans))
        // Loans
        .route("/loans/issue", post(loans::issue_item))
        .route("/loans/return", post(loans::return_item))
        .route("/loans/active", get(loans::active_loans))
        .route("/loans/history", get(loans::loan_history))
        // Statistics and reports
        .route("/dashboard/stats", get(stats::dashboard_stats))
        .route("/reports/loan-history", get(reports::loan_history_report))
        .with_state(state);

    // OpenAPI documentation
    let openapi = openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
