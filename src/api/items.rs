//! Catalog endpoints: items, authors and publishers

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
        author::{Author, CreateAuthor, CreatePublisher, Publisher},
        item::{CreateItem, Item, ItemQuery},
        loan::LoanDetails,
    },
};

use super::{ApiQuery, AuthenticatedStaff, ValidatedJson};

/// One page of catalog search results
#[derive(Serialize, ToSchema)]
pub struct ItemPage {
    /// Items on this page
    pub items: Vec<Item>,
    /// Total number of matching items
    pub total: i64,
    /// Current page number
    pub page: i64,
    /// Items per page
    pub per_page: i64,
}

/// Search the catalog with pagination
#[utoipa::path(
    get,
    path = "/items",
    tag = "items",
    security(("bearer_auth" = [])),
    params(ItemQuery),
    responses(
        (status = 200, description = "Matching items", body = ItemPage),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_items(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(_claims): AuthenticatedStaff,
    ApiQuery(query): ApiQuery<ItemQuery>,
) -> AppResult<Json<ItemPage>> {
    let (items, total) = state.services.catalog.search_items(&query).await?;
    let (page, per_page, _) = query.pagination();

    Ok(Json(ItemPage {
        items,
        total,
        page,
        per_page,
    }))
}

/// Create a new item
#[utoipa::path(
    post,
    path = "/items",
    tag = "items",
    security(("bearer_auth" = [])),
    request_body = CreateItem,
    responses(
        (status = 201, description = "Item created", body = Item),
        (status = 400, description = "Invalid data", body = crate::error::ErrorResponse),
        (status = 404, description = "Author or publisher not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Barcode already in use", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_item(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(claims): AuthenticatedStaff,
    ValidatedJson(item): ValidatedJson<CreateItem>,
) -> AppResult<(StatusCode, Json<Item>)> {
    let created = state.services.catalog.create_item(item, claims.staff_id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Get an item by barcode, with its availability
#[utoipa::path(
    get,
    path = "/items/barcode/{barcode}",
    tag = "items",
    security(("bearer_auth" = [])),
    params(
        ("barcode" = String, Path, description = "Item barcode, matched exactly")
    ),
    responses(
        (status = 200, description = "Item details", body = Item),
        (status = 404, description = "Item not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_item_by_barcode(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(_claims): AuthenticatedStaff,
    Path(barcode): Path<String>,
) -> AppResult<Json<Item>> {
    let item = state.services.catalog.get_by_barcode(&barcode).await?;
    Ok(Json(item))
}

/// Loan history of an item
#[utoipa::path(
    get,
    path = "/items/{id}/loans",
    tag = "items",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Loans of the item, newest first", body = Vec<LoanDetails>),
        (status = 404, description = "Item not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn item_loans(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(_claims): AuthenticatedStaff,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.catalog.item_loans(id).await?;
    Ok(Json(loans))
}

/// Create an author
#[utoipa::path(
    post,
    path = "/authors",
    tag = "items",
    security(("bearer_auth" = [])),
    request_body = CreateAuthor,
    responses(
        (status = 201, description = "Author created", body = Author),
        (status = 400, description = "Invalid data", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_author(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(_claims): AuthenticatedStaff,
    ValidatedJson(author): ValidatedJson<CreateAuthor>,
) -> AppResult<(StatusCode, Json<Author>)> {
    let created = state.services.catalog.create_author(author).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Create a publisher
#[utoipa::path(
    post,
    path = "/publishers",
    tag = "items",
    security(("bearer_auth" = [])),
    request_body = CreatePublisher,
    responses(
        (status = 201, description = "Publisher created", body = Publisher),
        (status = 400, description = "Invalid data", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_publisher(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(_claims): AuthenticatedStaff,
    ValidatedJson(publisher): ValidatedJson<CreatePublisher>,
) -> AppResult<(StatusCode, Json<Publisher>)> {
    let created = state.services.catalog.create_publisher(publisher).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// List authors ordered by name
#[utoipa::path(
    get,
    path = "/authors",
    tag = "items",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All authors", body = Vec<Author>)
    )
)]
pub async fn list_authors(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(_claims): AuthenticatedStaff,
) -> AppResult<Json<Vec<Author>>> {
    let authors = state.services.catalog.list_authors().await?;
    Ok(Json(authors))
}

/// List publishers ordered by name
#[utoipa::path(
    get,
    path = "/publishers",
    tag = "items",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All publishers", body = Vec<Publisher>)
    )
)]
pub async fn list_publishers(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(_claims): AuthenticatedStaff,
) -> AppResult<Json<Vec<Publisher>>> {
    let publishers = state.services.catalog.list_publishers().await?;
    Ok(Json(publishers))
}
