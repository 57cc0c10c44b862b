//! Patron registry service

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{HistoryFilter, LoanDetails},
        patron::{CreatePatron, Patron, PatronQuery},
    },
    repository::Repository,
};

use super::ledger::LedgerService;

#[derive(Clone)]
pub struct PatronsService {
    repository: Repository,
    ledger: LedgerService,
}

impl PatronsService {
    pub fn new(repository: Repository, ledger: LedgerService) -> Self {
        Self { repository, ledger }
    }

    pub async fn create_patron(&self, patron: CreatePatron, created_by: i32) -> AppResult<Patron> {
        let created = self.repository.patrons.create(&patron, created_by).await?;
        tracing::info!(patron_id = created.id, code = %created.code, "Patron registered");
        Ok(created)
    }

    /// Search patrons with pagination
    pub async fn search_patrons(&self, query: &PatronQuery) -> AppResult<(Vec<Patron>, i64)> {
        self.repository.patrons.search(query).await
    }

    /// Get patron by exact barcode, with active loan count
    pub async fn get_by_barcode(&self, barcode: &str) -> AppResult<Patron> {
        self.repository
            .patrons
            .find_by_barcode(barcode)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Patron with barcode {} not found", barcode)))
    }

    /// Every loan the patron ever held, newest first
    pub async fn patron_loans(&self, patron_id: i32) -> AppResult<Vec<LoanDetails>> {
        if self.repository.patrons.get(patron_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Patron {} not found", patron_id)));
        }

        self.ledger
            .history(&HistoryFilter {
                patron_id: Some(patron_id),
                ..Default::default()
            })
            .await
    }
}
