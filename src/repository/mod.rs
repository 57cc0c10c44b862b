//! Repository layer for database operations
//!
//! Each concern is a store trait so services stay independent of the backend.
//! `Repository::new` wires the PostgreSQL stores, `Repository::in_memory` the
//! process-local ones.

pub mod items;
pub mod loans;
pub mod memory;
pub mod patrons;
pub mod staff;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        author::{Author, CreateAuthor, CreatePublisher, Publisher},
        item::{CreateItem, Item, ItemQuery},
        loan::{HistoryFilter, LoanEntry, LoanRecord, NewLoan},
        patron::{CreatePatron, Patron, PatronQuery},
        staff::{CreateStaff, Staff},
    },
};

/// Item catalog lookups
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn get(&self, id: i32) -> AppResult<Option<Item>>;
    /// Exact, case-sensitive barcode match
    async fn find_by_barcode(&self, barcode: &str) -> AppResult<Option<Item>>;
    /// One page of matches ordered by code, plus the total match count
    async fn search(&self, query: &ItemQuery) -> AppResult<(Vec<Item>, i64)>;
    async fn create(&self, item: &CreateItem, created_by: i32) -> AppResult<Item>;
    async fn count(&self) -> AppResult<i64>;
    async fn create_author(&self, author: &CreateAuthor) -> AppResult<Author>;
    async fn create_publisher(&self, publisher: &CreatePublisher) -> AppResult<Publisher>;
    /// Ordered by last name, then first name
    async fn list_authors(&self) -> AppResult<Vec<Author>>;
    /// Ordered by name
    async fn list_publishers(&self) -> AppResult<Vec<Publisher>>;
}

/// Patron registry lookups
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PatronStore: Send + Sync {
    async fn get(&self, id: i32) -> AppResult<Option<Patron>>;
    /// Exact, case-sensitive barcode match
    async fn find_by_barcode(&self, barcode: &str) -> AppResult<Option<Patron>>;
    /// One page of matches ordered by last then first name, plus the total
    /// match count
    async fn search(&self, query: &PatronQuery) -> AppResult<(Vec<Patron>, i64)>;
    async fn create(&self, patron: &CreatePatron, created_by: i32) -> AppResult<Patron>;
    async fn count(&self) -> AppResult<i64>;
}

/// Staff directory
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StaffStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> AppResult<Option<Staff>>;
    async fn create(&self, staff: &CreateStaff) -> AppResult<Staff>;
    async fn count(&self) -> AppResult<i64>;
}

/// Loan ledger storage. The only writer of loan state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoanStore: Send + Sync {
    /// Insert an open record. Fails with `Conflict` when the item already has
    /// one; the check and the insert are atomic.
    async fn insert_open(&self, loan: &NewLoan) -> AppResult<LoanRecord>;
    /// Close the open record of an item, `None` when there is none
    async fn close_open(
        &self,
        item_id: i32,
        returned_by: i32,
        returned_at: DateTime<Utc>,
    ) -> AppResult<Option<LoanRecord>>;
    async fn find_open_by_item(&self, item_id: i32) -> AppResult<Option<LoanRecord>>;
    /// Newest `issued_at` first
    async fn history(&self, filter: &HistoryFilter) -> AppResult<Vec<LoanEntry>>;
    /// Open records matching a lowercase search term, newest first
    async fn active(&self, search: Option<String>) -> AppResult<Vec<LoanEntry>>;
    async fn count_open(&self) -> AppResult<i64>;
    async fn count_items_on_loan(&self) -> AppResult<i64>;
    async fn count_issued_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<i64>;
    async fn count_returned_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<i64>;
    async fn count_open_issued_before(&self, cutoff: DateTime<Utc>) -> AppResult<i64>;
}

/// Main repository struct holding the stores
#[derive(Clone)]
pub struct Repository {
    pub items: Arc<dyn ItemStore>,
    pub patrons: Arc<dyn PatronStore>,
    pub loans: Arc<dyn LoanStore>,
    pub staff: Arc<dyn StaffStore>,
    pool: Option<Pool<Postgres>>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            items: Arc::new(items::ItemsRepository::new(pool.clone())),
            patrons: Arc::new(patrons::PatronsRepository::new(pool.clone())),
            loans: Arc::new(loans::LoansRepository::new(pool.clone())),
            staff: Arc::new(staff::StaffRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Repository backed by a fresh process-local store
    pub fn in_memory() -> Self {
        let store = memory::MemoryStore::default();
        Self {
            items: Arc::new(store.clone()),
            patrons: Arc::new(store.clone()),
            loans: Arc::new(store.clone()),
            staff: Arc::new(store),
            pool: None,
        }
    }

    /// Assemble a repository from individual stores
    pub fn from_stores(
        items: Arc<dyn ItemStore>,
        patrons: Arc<dyn PatronStore>,
        loans: Arc<dyn LoanStore>,
        staff: Arc<dyn StaffStore>,
    ) -> Self {
        Self {
            items,
            patrons,
            loans,
            staff,
            pool: None,
        }
    }

    /// Check that the backing store answers
    pub async fn ping(&self) -> AppResult<()> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}

/// Build a `LIKE` pattern matching `term` as a substring.
/// `term` should already be lowercased.
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("war"), "%war%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
