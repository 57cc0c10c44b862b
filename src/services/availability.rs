//! Availability engine
//!
//! Decides whether an item can be issued and serializes issue and return per
//! item. Holding the item lock makes the availability check and the ledger
//! write one step for this process; the store's uniqueness guarantee covers
//! writers outside it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;

use crate::{
    error::{AppError, AppResult, HolderDetails},
    models::{
        item::Item,
        loan::{days_between, LoanDetails, LoanEntry, ReturnReceipt},
        patron::Patron,
    },
    repository::Repository,
};

use super::ledger::LedgerService;

/// Async mutex for one item and the number of tasks holding or awaiting it
#[derive(Debug, Default)]
struct LockEntry {
    lock: Arc<tokio::sync::Mutex<()>>,
    users: usize,
}

/// Async mutexes keyed by item id, created on demand and dropped when unused
#[derive(Debug, Clone, Default)]
struct ItemLocks {
    inner: Arc<Mutex<HashMap<i32, LockEntry>>>,
}

impl ItemLocks {
    async fn acquire(&self, item_id: i32) -> ItemGuard {
        let user = self.register(item_id);
        let guard = user.lock.clone().lock_owned().await;

        ItemGuard {
            _guard: guard,
            _user: user,
        }
    }

    fn register(&self, item_id: i32) -> LockUser {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = locks.entry(item_id).or_default();
        entry.users += 1;

        LockUser {
            item_id,
            locks: self.clone(),
            lock: entry.lock.clone(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Registration of one task on an item lock. Dropping the last one, whether
/// the task got the lock or was cancelled while waiting, prunes the entry.
#[derive(Debug)]
struct LockUser {
    item_id: i32,
    locks: ItemLocks,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for LockUser {
    fn drop(&mut self) {
        let mut locks = self.locks.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = locks.get_mut(&self.item_id) {
            entry.users = entry.users.saturating_sub(1);
            if entry.users == 0 {
                locks.remove(&self.item_id);
            }
        }
    }
}

/// Held item lock. Fields drop in order, so the mutex is released before
/// the registration.
#[derive(Debug)]
struct ItemGuard {
    _guard: OwnedMutexGuard<()>,
    _user: LockUser,
}

#[derive(Clone)]
pub struct AvailabilityService {
    repository: Repository,
    ledger: LedgerService,
    locks: ItemLocks,
}

impl AvailabilityService {
    pub fn new(repository: Repository, ledger: LedgerService) -> Self {
        Self {
            repository,
            ledger,
            locks: ItemLocks::default(),
        }
    }

    /// True iff the item has no open loan
    pub async fn is_available(&self, item_id: i32) -> AppResult<bool> {
        Ok(self.ledger.find_open_by_item(item_id).await?.is_none())
    }

    /// Issue an item to a patron, both identified by barcode
    pub async fn issue(
        &self,
        item_barcode: &str,
        patron_barcode: &str,
        actor_id: i32,
    ) -> AppResult<LoanDetails> {
        self.issue_at(item_barcode, patron_barcode, actor_id, Utc::now())
            .await
    }

    pub async fn issue_at(
        &self,
        item_barcode: &str,
        patron_barcode: &str,
        actor_id: i32,
        at: DateTime<Utc>,
    ) -> AppResult<LoanDetails> {
        let item = self.item_by_barcode(item_barcode).await?;
        let patron = self
            .repository
            .patrons
            .find_by_barcode(patron_barcode)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Patron with barcode {} not found", patron_barcode))
            })?;

        let _guard = self.locks.acquire(item.id).await;

        if let Some(open) = self.ledger.find_open_by_item(item.id).await? {
            let holder = match self.repository.patrons.get(open.patron_id).await? {
                Some(holder) => holder.display_name(),
                None => format!("patron #{}", open.patron_id),
            };
            tracing::info!(
                item_id = item.id,
                loan_id = open.id,
                holder = %holder,
                "Issue refused, item already on loan"
            );
            return Err(AppError::AlreadyLoaned(HolderDetails {
                holder,
                issued_at: open.issued_at,
            }));
        }

        let record = self
            .ledger
            .open(item.id, patron.id, actor_id, at)
            .await
            .inspect_err(|e| {
                if matches!(e, AppError::Conflict(_)) {
                    tracing::warn!(item_id = item.id, "Open loan already recorded by another writer");
                }
            })?;

        tracing::info!(
            loan_id = record.id,
            item_id = item.id,
            patron_id = patron.id,
            actor_id,
            "Item issued"
        );

        Ok(LoanDetails::from_entry(
            LoanEntry {
                record,
                item: item.short(),
                patron: patron.short(),
            },
            at,
        ))
    }

    /// Return an item identified by barcode
    pub async fn return_item(&self, item_barcode: &str, actor_id: i32) -> AppResult<ReturnReceipt> {
        self.return_item_at(item_barcode, actor_id, Utc::now()).await
    }

    pub async fn return_item_at(
        &self,
        item_barcode: &str,
        actor_id: i32,
        at: DateTime<Utc>,
    ) -> AppResult<ReturnReceipt> {
        let item = self.item_by_barcode(item_barcode).await?;

        let _guard = self.locks.acquire(item.id).await;

        let record = self.ledger.close(item.id, actor_id, at).await.map_err(|e| match e {
            AppError::NoActiveLoan(_) => {
                AppError::NoActiveLoan(format!("No active loan for item {}", item_barcode))
            }
            other => other,
        })?;
        let patron = self.patron_by_id(record.patron_id).await?;
        let returned_at = record.returned_at.unwrap_or(at);

        tracing::info!(
            loan_id = record.id,
            item_id = item.id,
            patron_id = patron.id,
            actor_id,
            "Item returned"
        );

        Ok(ReturnReceipt {
            loan_id: record.id,
            item: item.short(),
            patron: patron.short(),
            issued_at: record.issued_at,
            returned_at,
            days_on_loan: days_between(record.issued_at, returned_at),
        })
    }

    async fn item_by_barcode(&self, barcode: &str) -> AppResult<Item> {
        self.repository
            .items
            .find_by_barcode(barcode)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item with barcode {} not found", barcode)))
    }

    async fn patron_by_id(&self, id: i32) -> AppResult<Patron> {
        self.repository
            .patrons
            .get(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Loan references missing patron {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            item::{CreateItem, ItemKind},
            loan::LoanStatus,
            patron::CreatePatron,
            staff::{CreateStaff, StaffRole},
        },
        repository::{MockItemStore, MockLoanStore, MockPatronStore, MockStaffStore},
    };
    use chrono::{Duration, TimeZone};

    struct Fixture {
        repository: Repository,
        engine: AvailabilityService,
        staff_id: i32,
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

        for barcode in ["B1", "B2"] {
            repository
                .items
                .create(
                    &CreateItem {
                        kind: ItemKind::Book,
                        barcode: barcode.to_string(),
                        title: format!("Book {}", barcode),
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
        }
        for (barcode, last, first) in [("P1", "Ivanov", "Ivan"), ("P2", "Petrova", "Anna")] {
            repository
                .patrons
                .create(
                    &CreatePatron {
                        barcode: barcode.to_string(),
                        last_name: last.to_string(),
                        first_name: first.to_string(),
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
        }

        let engine = AvailabilityService::new(repository.clone(), LedgerService::new(repository.clone()));
        Fixture {
            repository,
            engine,
            staff_id: staff.id,
        }
    }

    #[tokio::test]
    async fn test_issue_then_return() {
        let f = fixture().await;
        let issued = Utc::now() - Duration::days(3) - Duration::hours(2);

        let loan = f.engine.issue_at("B1", "P1", f.staff_id, issued).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Open);
        assert_eq!(loan.patron.display_name, "Ivanov Ivan");
        assert!(!f.engine.is_available(loan.item_id).await.unwrap());

        let receipt = f.engine.return_item("B1", f.staff_id).await.unwrap();
        assert_eq!(receipt.loan_id, loan.id);
        assert_eq!(receipt.days_on_loan, 3);
        assert!(f.engine.is_available(loan.item_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_issue_held_item_reports_holder() {
        let f = fixture().await;
        let issued = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        f.engine.issue_at("B1", "P1", f.staff_id, issued).await.unwrap();

        let err = f.engine.issue("B1", "P2", f.staff_id).await.unwrap_err();
        match err {
            AppError::AlreadyLoaned(details) => {
                assert_eq!(details.holder, "Ivanov Ivan");
                assert_eq!(details.issued_at, issued);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(f.repository.loans.count_open().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_barcodes() {
        let f = fixture().await;
        assert!(matches!(
            f.engine.issue("NOPE", "P1", f.staff_id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.engine.issue("B1", "NOPE", f.staff_id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.engine.return_item("NOPE", f.staff_id).await,
            Err(AppError::NotFound(_))
        ));
        // Barcodes are matched exactly
        assert!(matches!(
            f.engine.issue("b1", "P1", f.staff_id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_double_return() {
        let f = fixture().await;
        f.engine.issue("B1", "P1", f.staff_id).await.unwrap();
        f.engine.return_item("B1", f.staff_id).await.unwrap();

        let err = f.engine.return_item("B1", f.staff_id).await.unwrap_err();
        assert!(matches!(err, AppError::NoActiveLoan(_)));
    }

    #[tokio::test]
    async fn test_reissue_after_return_keeps_history() {
        let f = fixture().await;
        let t0 = Utc::now() - Duration::days(10);
        f.engine.issue_at("B1", "P1", f.staff_id, t0).await.unwrap();
        f.engine
            .return_item_at("B1", f.staff_id, t0 + Duration::days(2))
            .await
            .unwrap();
        f.engine
            .issue_at("B1", "P2", f.staff_id, t0 + Duration::days(3))
            .await
            .unwrap();

        let history = f.repository.loans.history(&Default::default()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].patron.barcode, "P2");
        assert!(history[0].record.is_open());
        assert!(!history[1].record.is_open());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_issue_has_single_winner() {
        let f = fixture().await;

        let attempts: Vec<_> = ["P1", "P2", "P1", "P2", "P1", "P2", "P1", "P2"]
            .into_iter()
            .map(|patron| {
                let engine = f.engine.clone();
                let staff_id = f.staff_id;
                tokio::spawn(async move { engine.issue("B1", patron, staff_id).await })
            })
            .collect();

        let mut won = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => won += 1,
                Err(AppError::AlreadyLoaned(_)) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(won, 1);
        assert_eq!(f.repository.loans.count_open().await.unwrap(), 1);
        assert_eq!(f.engine.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_unrelated_items_do_not_contend() {
        let f = fixture().await;
        let _held = f.engine.locks.acquire(1).await;

        let other = tokio::time::timeout(std::time::Duration::from_secs(1), f.engine.locks.acquire(2)).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_same_item_waits_for_release() {
        let locks = ItemLocks::default();
        let held = locks.acquire(1).await;

        let mut waiter = tokio_test::task::spawn(locks.acquire(1));
        tokio_test::assert_pending!(waiter.poll());

        drop(held);
        assert!(waiter.is_woken());
        let _guard = tokio_test::assert_ready!(waiter.poll());
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_leak_entry() {
        let locks = ItemLocks::default();
        let held = locks.acquire(7).await;

        let mut waiter = tokio_test::task::spawn(locks.acquire(7));
        tokio_test::assert_pending!(waiter.poll());

        drop(held);
        assert_eq!(locks.len(), 1);
        drop(waiter);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_store_conflict_surfaces_as_conflict() {
        let item = Item {
            id: 1,
            kind: ItemKind::Disk,
            code: "000001".to_string(),
            barcode: "D1".to_string(),
            title: "Sonatas".to_string(),
            short_title: None,
            isbn: None,
            publication_year: None,
            location: None,
            author_id: None,
            publisher_id: None,
            author: None,
            publisher: None,
            created_at: Utc::now(),
            created_by: None,
            available: true,
        };
        let patron = Patron {
            id: 2,
            code: "000001".to_string(),
            barcode: "P1".to_string(),
            last_name: "Ivanov".to_string(),
            first_name: "Ivan".to_string(),
            middle_name: None,
            user_type: "student".to_string(),
            grade: None,
            phone: None,
            email: None,
            comments: None,
            created_at: Utc::now(),
            created_by: None,
            active_loan_count: 0,
        };

        let mut items = MockItemStore::new();
        let found = item.clone();
        items
            .expect_find_by_barcode()
            .returning(move |_| Ok(Some(found.clone())));
        items.expect_get().returning(move |_| Ok(Some(item.clone())));

        let mut patrons = MockPatronStore::new();
        let found = patron.clone();
        patrons
            .expect_find_by_barcode()
            .returning(move |_| Ok(Some(found.clone())));
        patrons.expect_get().returning(move |_| Ok(Some(patron.clone())));

        // Another writer opened a loan between the check and the insert
        let mut loans = MockLoanStore::new();
        loans.expect_find_open_by_item().returning(|_| Ok(None));
        loans
            .expect_insert_open()
            .returning(|_| Err(AppError::Conflict("Item 1 already has an open loan".to_string())));

        let repository = Repository::from_stores(
            Arc::new(items),
            Arc::new(patrons),
            Arc::new(loans),
            Arc::new(MockStaffStore::new()),
        );
        let engine = AvailabilityService::new(repository.clone(), LedgerService::new(repository));

        let err = engine.issue("D1", "P1", 1).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_return_does_not_touch_closed_records() {
        let mut loans = MockLoanStore::new();
        loans.expect_find_open_by_item().returning(|_| Ok(None));
        loans.expect_close_open().never();

        let mut items = MockItemStore::new();
        items.expect_find_by_barcode().returning(|_| {
            Ok(Some(Item {
                id: 1,
                kind: ItemKind::Book,
                code: "000001".to_string(),
                barcode: "B1".to_string(),
                title: "Title".to_string(),
                short_title: None,
                isbn: None,
                publication_year: None,
                location: None,
                author_id: None,
                publisher_id: None,
                author: None,
                publisher: None,
                created_at: Utc::now(),
                created_by: None,
                available: true,
            }))
        });

        let repository = Repository::from_stores(
            Arc::new(items),
            Arc::new(MockPatronStore::new()),
            Arc::new(loans),
            Arc::new(MockStaffStore::new()),
        );
        let engine = AvailabilityService::new(repository.clone(), LedgerService::new(repository));

        let err = engine.return_item("B1", 1).await.unwrap_err();
        assert!(matches!(err, AppError::NoActiveLoan(_)));
    }
}
