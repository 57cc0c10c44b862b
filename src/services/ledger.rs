//! Loan ledger service
//!
//! The authoritative record of who holds what since when. Records are only
//! ever opened and closed, never deleted or reassigned.

use chrono::{DateTime, Utc};

use crate::{
    error::{AppError, AppResult},
    models::loan::{HistoryFilter, LoanDetails, LoanRecord, NewLoan},
    repository::Repository,
};

#[derive(Clone)]
pub struct LedgerService {
    repository: Repository,
}

impl LedgerService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Record a new open loan.
    ///
    /// Fails with `NotFound` when the item or patron does not exist and with
    /// `Conflict` when the item already has an open loan.
    pub async fn open(
        &self,
        item_id: i32,
        patron_id: i32,
        actor_id: i32,
        at: DateTime<Utc>,
    ) -> AppResult<LoanRecord> {
        if self.repository.items.get(item_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Item {} not found", item_id)));
        }
        if self.repository.patrons.get(patron_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Patron {} not found", patron_id)));
        }

        self.repository
            .loans
            .insert_open(&NewLoan {
                item_id,
                patron_id,
                issued_by: actor_id,
                issued_at: at,
            })
            .await
    }

    /// Close the open loan of an item
    pub async fn close(&self, item_id: i32, actor_id: i32, at: DateTime<Utc>) -> AppResult<LoanRecord> {
        let open = self
            .repository
            .loans
            .find_open_by_item(item_id)
            .await?
            .ok_or_else(|| AppError::NoActiveLoan(format!("Item {} has no active loan", item_id)))?;

        if at < open.issued_at {
            return Err(AppError::Validation(format!(
                "Return time {} precedes issue time {}",
                at, open.issued_at
            )));
        }

        // A concurrent return may have closed it in between
        self.repository
            .loans
            .close_open(item_id, actor_id, at)
            .await?
            .ok_or_else(|| AppError::NoActiveLoan(format!("Item {} has no active loan", item_id)))
    }

    pub async fn find_open_by_item(&self, item_id: i32) -> AppResult<Option<LoanRecord>> {
        self.repository.loans.find_open_by_item(item_id).await
    }

    /// Filtered history, newest first
    pub async fn history(&self, filter: &HistoryFilter) -> AppResult<Vec<LoanDetails>> {
        let now = Utc::now();
        let entries = self.repository.loans.history(filter).await?;
        Ok(entries
            .into_iter()
            .map(|entry| LoanDetails::from_entry(entry, now))
            .collect())
    }

    /// Open loans, optionally narrowed by a case-insensitive search term
    pub async fn active_loans(&self, search: Option<&str>) -> AppResult<Vec<LoanDetails>> {
        let term = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let now = Utc::now();
        let entries = self.repository.loans.active(term).await?;
        Ok(entries
            .into_iter()
            .map(|entry| LoanDetails::from_entry(entry, now))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            item::{CreateItem, ItemKind},
            loan::{LoanHistoryQuery, LoanStatus},
            patron::CreatePatron,
            staff::{CreateStaff, StaffRole},
        },
        repository::{MockItemStore, MockLoanStore, MockPatronStore, MockStaffStore},
    };
    use chrono::{Duration, Local, NaiveDate, TimeZone};
    use std::sync::Arc;

    struct Fixture {
        ledger: LedgerService,
        staff_id: i32,
        item_id: i32,
        patron_id: i32,
    }

    async fn fixture() -> Fixture {
        let repository = Repository::in_memory();
        let staff = repository
            .staff
            .create(&CreateStaff {
                username: "desk".to_string(),
                password_hash: String::new(),
                full_name: "Front Desk".to_string(),
                role: StaffRole::Librarian,
            })
            .await
            .unwrap();
        let item = repository
            .items
            .create(
                &CreateItem {
                    kind: ItemKind::Book,
                    barcode: "B1".to_string(),
                    title: "Dead Souls".to_string(),
                    short_title: None,
                    isbn: None,
                    publication_year: None,
                    location: None,
                    author_id: None,
                    publisher_id: None,
                },
                staff.id,
            )
            .await
            .unwrap();
        let patron = repository
            .patrons
            .create(
                &CreatePatron {
                    barcode: "P1".to_string(),
                    last_name: "Orlov".to_string(),
                    first_name: "Pavel".to_string(),
                    middle_name: None,
                    user_type: None,
                    grade: None,
                    phone: None,
                    email: None,
                    comments: None,
                },
                staff.id,
            )
            .await
            .unwrap();

        Fixture {
            ledger: LedgerService::new(repository),
            staff_id: staff.id,
            item_id: item.id,
            patron_id: patron.id,
        }
    }

    #[tokio::test]
    async fn test_open_then_close() {
        let f = fixture().await;
        let issued = Utc::now() - Duration::days(2);

        let open = f.ledger.open(f.item_id, f.patron_id, f.staff_id, issued).await.unwrap();
        assert_eq!(open.status, LoanStatus::Open);
        assert!(open.returned_at.is_none());

        let closed = f.ledger.close(f.item_id, f.staff_id, Utc::now()).await.unwrap();
        assert_eq!(closed.id, open.id);
        assert_eq!(closed.status, LoanStatus::Closed);
        assert_eq!(closed.returned_by, Some(f.staff_id));
        assert!(f.ledger.find_open_by_item(f.item_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_twice_conflicts() {
        let f = fixture().await;
        f.ledger.open(f.item_id, f.patron_id, f.staff_id, Utc::now()).await.unwrap();
        let err = f
            .ledger
            .open(f.item_id, f.patron_id, f.staff_id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_open_unknown_patron() {
        let f = fixture().await;
        let err = f.ledger.open(f.item_id, 4242, f.staff_id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_close_without_open_loan() {
        let f = fixture().await;
        let err = f.ledger.close(f.item_id, f.staff_id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::NoActiveLoan(_)));
    }

    #[tokio::test]
    async fn test_close_before_issue_is_rejected() {
        let f = fixture().await;
        let issued = Utc::now();
        f.ledger.open(f.item_id, f.patron_id, f.staff_id, issued).await.unwrap();

        let err = f
            .ledger
            .close(f.item_id, f.staff_id, issued - Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(f.ledger.find_open_by_item(f.item_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_history_date_bounds_follow_local_calendar_day() {
        let f = fixture().await;
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let at = |date: NaiveDate, h: u32, m: u32| {
            Local
                .from_local_datetime(&date.and_hms_opt(h, m, 0).unwrap())
                .earliest()
                .unwrap()
                .with_timezone(&Utc)
        };

        let mut loan_ids = Vec::new();
        for issued in [
            at(day.pred_opt().unwrap(), 12, 0),
            at(day, 23, 59),
            at(day.succ_opt().unwrap(), 12, 0),
        ] {
            let open = f.ledger.open(f.item_id, f.patron_id, f.staff_id, issued).await.unwrap();
            f.ledger
                .close(f.item_id, f.staff_id, issued + Duration::seconds(30))
                .await
                .unwrap();
            loan_ids.push(open.id);
        }

        let filter = LoanHistoryQuery {
            date_from: Some(day),
            date_to: Some(day),
            ..Default::default()
        }
        .to_filter()
        .unwrap();
        let history = f.ledger.history(&filter).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, loan_ids[1]);
    }

    #[tokio::test]
    async fn test_active_loans_search_is_case_insensitive() {
        let f = fixture().await;
        f.ledger.open(f.item_id, f.patron_id, f.staff_id, Utc::now()).await.unwrap();

        assert_eq!(f.ledger.active_loans(Some("DEAD")).await.unwrap().len(), 1);
        assert_eq!(f.ledger.active_loans(Some("orlov")).await.unwrap().len(), 1);
        assert_eq!(f.ledger.active_loans(Some("Orlov Pavel")).await.unwrap().len(), 1);
        assert_eq!(f.ledger.active_loans(Some("  ")).await.unwrap().len(), 1);
        assert!(f.ledger.active_loans(Some("gogol")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_lost_race_reports_no_active_loan() {
        let mut loans = MockLoanStore::new();
        let issued = Utc::now() - Duration::days(1);
        loans.expect_find_open_by_item().returning(move |item_id| {
            Ok(Some(LoanRecord {
                id: 1,
                item_id,
                patron_id: 2,
                issued_at: issued,
                returned_at: None,
                issued_by: 3,
                returned_by: None,
                status: LoanStatus::Open,
            }))
        });
        loans.expect_close_open().returning(|_, _, _| Ok(None));

        let repository = Repository::from_stores(
            Arc::new(MockItemStore::new()),
            Arc::new(MockPatronStore::new()),
            Arc::new(loans),
            Arc::new(MockStaffStore::new()),
        );
        let err = LedgerService::new(repository)
            .close(10, 3, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoActiveLoan(_)));
    }
}
