//! Loanable item (book or disk) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Postgres};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::{
    author::{AuthorShort, PublisherShort},
    normalize_term, page_window,
};

/// Physical kind of a loanable item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Book,
    Disk,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Book => "book",
            ItemKind::Disk => "disk",
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "book" => Ok(ItemKind::Book),
            "disk" => Ok(ItemKind::Disk),
            _ => Err(format!("Invalid item kind: {}", s)),
        }
    }
}

// SQLx conversion for ItemKind
impl sqlx::Type<Postgres> for ItemKind {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for ItemKind {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for ItemKind {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Catalog item with its derived availability
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Item {
    pub id: i32,
    pub kind: ItemKind,
    /// Sequential human-readable code
    pub code: String,
    pub barcode: String,
    pub title: String,
    pub short_title: Option<String>,
    pub isbn: Option<String>,
    pub publication_year: Option<i32>,
    pub location: Option<String>,
    pub author_id: Option<i32>,
    pub publisher_id: Option<i32>,
    pub author: Option<AuthorShort>,
    pub publisher: Option<PublisherShort>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<i32>,
    /// True iff no open loan references this item
    pub available: bool,
}

impl Item {
    pub fn short(&self) -> ItemShort {
        ItemShort {
            id: self.id,
            kind: self.kind,
            code: self.code.clone(),
            barcode: self.barcode.clone(),
            title: self.title.clone(),
        }
    }
}

/// Item reference embedded in loan views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ItemShort {
    pub id: i32,
    pub kind: ItemKind,
    pub code: String,
    pub barcode: String,
    pub title: String,
}

/// Create item request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateItem {
    pub kind: ItemKind,
    #[validate(length(min = 1, max = 64, message = "barcode must be 1-64 characters"))]
    pub barcode: String,
    #[validate(length(min = 1, max = 512, message = "title must not be empty"))]
    pub title: String,
    pub short_title: Option<String>,
    pub isbn: Option<String>,
    #[validate(range(min = 0, max = 9999))]
    pub publication_year: Option<i32>,
    pub location: Option<String>,
    pub author_id: Option<i32>,
    pub publisher_id: Option<i32>,
}

/// Catalog search query
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ItemQuery {
    /// Substring of title, barcode, ISBN, author last name or publisher name
    pub search: Option<String>,
    /// Restrict to one item kind
    pub kind: Option<ItemKind>,
    /// Page number (default: 1)
    pub page: Option<i64>,
    /// Items per page (default: 20, max: 100)
    pub per_page: Option<i64>,
}

impl ItemQuery {
    /// Normalized (page, per_page, offset)
    pub fn pagination(&self) -> (i64, i64, i64) {
        page_window(self.page, self.per_page)
    }

    /// Lowercased search term, `None` when blank
    pub fn search_term(&self) -> Option<String> {
        normalize_term(self.search.as_deref())
    }
}

/// Generate the next sequential code from the current maximum
pub fn next_code(current_max: i64) -> String {
    format!("{:06}", current_max + 1)
}

/// Order sequential codes numerically: shorter codes first, then by text
pub fn cmp_codes(a: &str, b: &str) -> std::cmp::Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
