//! Business logic services

pub mod auth;
pub mod availability;
pub mod catalog;
pub mod ledger;
pub mod patrons;
pub mod stats;

use crate::{config::AuthConfig, error::AppResult, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub catalog: catalog::CatalogService,
    pub patrons: patrons::PatronsService,
    pub ledger: ledger::LedgerService,
    pub availability: availability::AvailabilityService,
    pub stats: stats::StatsService,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, auth_config: AuthConfig) -> Self {
        let ledger = ledger::LedgerService::new(repository.clone());

        Self {
            auth: auth::AuthService::new(repository.clone(), auth_config),
            catalog: catalog::CatalogService::new(repository.clone(), ledger.clone()),
            patrons: patrons::PatronsService::new(repository.clone(), ledger.clone()),
            availability: availability::AvailabilityService::new(repository.clone(), ledger.clone()),
            stats: stats::StatsService::new(repository.clone(), ledger.clone()),
            ledger,
            repository,
        }
    }

    /// Check that the backing store answers
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.ping().await
    }
}
