//! Data models for the library server

pub mod author;
pub mod item;
pub mod loan;
pub mod patron;
pub mod staff;

// Re-export commonly used types
pub use author::{Author, Publisher};
pub use item::{Item, ItemKind, ItemShort};
pub use loan::{LoanDetails, LoanRecord, LoanStatus, ReturnReceipt};
pub use patron::{Patron, PatronShort};
pub use staff::{Staff, StaffClaims, StaffRole};

/// Default page size for paginated listings
pub const DEFAULT_PER_PAGE: i64 = 20;
/// Upper bound on page size for paginated listings
pub const MAX_PER_PAGE: i64 = 100;

/// Normalized (page, per_page, offset) for client-supplied paging
pub fn page_window(page: Option<i64>, per_page: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    (page, per_page, (page - 1).saturating_mul(per_page))
}

/// Lowercased search term, `None` when blank
pub fn normalize_term(term: Option<&str>) -> Option<String> {
    term.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}
