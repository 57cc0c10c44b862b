//! Statistics and report projections

use chrono::{DateTime, Duration, Utc};

use crate::{
    api::{
        reports::{LoanHistoryReport, ReportSummary},
        stats::DashboardStats,
    },
    error::AppResult,
    models::loan::{local_today_bounds, LoanHistoryQuery, OVERDUE_AFTER_DAYS},
    repository::Repository,
};

use super::ledger::LedgerService;

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
    ledger: LedgerService,
}

impl StatsService {
    pub fn new(repository: Repository, ledger: LedgerService) -> Self {
        Self { repository, ledger }
    }

    /// Dashboard counters as of now
    pub async fn dashboard(&self) -> AppResult<DashboardStats> {
        self.dashboard_at(Utc::now()).await
    }

    /// Dashboard counters, with "today" taken as the local calendar day of `now`
    pub async fn dashboard_at(&self, now: DateTime<Utc>) -> AppResult<DashboardStats> {
        let (today_start, today_end) = local_today_bounds(now)?;
        let overdue_cutoff = now - Duration::days(OVERDUE_AFTER_DAYS);
        let loans = &self.repository.loans;

        let total_items = self.repository.items.count().await?;
        let on_loan = loans.count_items_on_loan().await?;

        Ok(DashboardStats {
            total_items,
            available_items: (total_items - on_loan).max(0),
            total_patrons: self.repository.patrons.count().await?,
            active_loans: loans.count_open().await?,
            today_issued: loans.count_issued_between(today_start, today_end).await?,
            today_returned: loans.count_returned_between(today_start, today_end).await?,
            overdue_loans: loans.count_open_issued_before(overdue_cutoff).await?,
        })
    }

    /// Loan history report with open/closed totals
    pub async fn loan_history_report(&self, query: &LoanHistoryQuery) -> AppResult<LoanHistoryReport> {
        let loans = self.ledger.history(&query.to_filter()?).await?;
        let open = loans.iter().filter(|l| l.returned_at.is_none()).count() as i64;
        let total = loans.len() as i64;

        Ok(LoanHistoryReport {
            summary: ReportSummary {
                total,
                open,
                closed: total - open,
            },
            loans,
        })
    }
}
