//! Patron (reader) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::{normalize_term, page_window};

/// Registered reader eligible to borrow items
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Patron {
    pub id: i32,
    pub code: String,
    pub barcode: String,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub user_type: String,
    pub grade: Option<i32>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<i32>,
    /// Number of open loans held by this patron
    pub active_loan_count: i64,
}

impl Patron {
    /// "Last First", the form shown to staff
    pub fn display_name(&self) -> String {
        display_name(&self.last_name, &self.first_name)
    }

    pub fn short(&self) -> PatronShort {
        PatronShort {
            id: self.id,
            barcode: self.barcode.clone(),
            display_name: self.display_name(),
        }
    }
}

pub fn display_name(last_name: &str, first_name: &str) -> String {
    format!("{} {}", last_name, first_name).trim().to_string()
}

/// Patron reference embedded in loan views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PatronShort {
    pub id: i32,
    pub barcode: String,
    pub display_name: String,
}

/// Create patron request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreatePatron {
    #[validate(length(min = 1, max = 64, message = "barcode must be 1-64 characters"))]
    pub barcode: String,
    #[validate(length(min = 1, message = "last_name must not be empty"))]
    pub last_name: String,
    #[validate(length(min = 1, message = "first_name must not be empty"))]
    pub first_name: String,
    pub middle_name: Option<String>,
    pub user_type: Option<String>,
    #[validate(range(min = 1, max = 12))]
    pub grade: Option<i32>,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub comments: Option<String>,
}

/// Patron registry search query
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PatronQuery {
    /// Substring of last name, first name, barcode or phone
    pub search: Option<String>,
    /// Page number (default: 1)
    pub page: Option<i64>,
    /// Patrons per page (default: 20, max: 100)
    pub per_page: Option<i64>,
}

impl PatronQuery {
    /// Normalized (page, per_page, offset)
    pub fn pagination(&self) -> (i64, i64, i64) {
        page_window(self.page, self.per_page)
    }

    pub fn search_term(&self) -> Option<String> {
        normalize_term(self.search.as_deref())
    }
}
