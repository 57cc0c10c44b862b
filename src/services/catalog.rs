//! Catalog service for items, authors and publishers

use crate::{
    error::{AppError, AppResult},
    models::{
        author::{Author, CreateAuthor, CreatePublisher, Publisher},
        item::{CreateItem, Item, ItemQuery},
        loan::{HistoryFilter, LoanDetails},
    },
    repository::Repository,
};

use super::ledger::LedgerService;

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    ledger: LedgerService,
}

impl CatalogService {
    pub fn new(repository: Repository, ledger: LedgerService) -> Self {
        Self { repository, ledger }
    }

    /// Search items with pagination
    pub async fn search_items(&self, query: &ItemQuery) -> AppResult<(Vec<Item>, i64)> {
        self.repository.items.search(query).await
    }

    /// Get item by exact barcode, with availability
    pub async fn get_by_barcode(&self, barcode: &str) -> AppResult<Item> {
        self.repository
            .items
            .find_by_barcode(barcode)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item with barcode {} not found", barcode)))
    }

    /// Create a new item; its code is generated
    pub async fn create_item(&self, item: CreateItem, created_by: i32) -> AppResult<Item> {
        let created = self.repository.items.create(&item, created_by).await?;
        tracing::info!(item_id = created.id, code = %created.code, "Item created");
        Ok(created)
    }

    pub async fn create_author(&self, author: CreateAuthor) -> AppResult<Author> {
        self.repository.items.create_author(&author).await
    }

    pub async fn create_publisher(&self, publisher: CreatePublisher) -> AppResult<Publisher> {
        self.repository.items.create_publisher(&publisher).await
    }

    pub async fn list_authors(&self) -> AppResult<Vec<Author>> {
        self.repository.items.list_authors().await
    }

    pub async fn list_publishers(&self) -> AppResult<Vec<Publisher>> {
        self.repository.items.list_publishers().await
    }

    /// Full loan history of an item, newest first
    pub async fn item_loans(&self, item_id: i32) -> AppResult<Vec<LoanDetails>> {
        if self.repository.items.get(item_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Item {} not found", item_id)));
        }

        self.ledger
            .history(&HistoryFilter {
                item_id: Some(item_id),
                ..Default::default()
            })
            .await
    }
}
