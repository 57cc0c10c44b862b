//! Process-local store with the same semantics as the PostgreSQL repository.
//!
//! All stores share one `RwLock`ed state. Writers hold the write guard for the
//! whole check-and-mutate, which gives the at-most-one-open-loan guarantee the
//! database gets from its partial unique index.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::{
        author::{Author, AuthorShort, CreateAuthor, CreatePublisher, Publisher, PublisherShort},
        item::{cmp_codes, next_code, CreateItem, Item, ItemQuery},
        loan::{HistoryFilter, LoanEntry, LoanRecord, LoanStatus, NewLoan},
        patron::{CreatePatron, Patron, PatronQuery},
        staff::{CreateStaff, Staff},
    },
};

use super::{ItemStore, LoanStore, PatronStore, StaffStore};

#[derive(Default)]
struct MemoryState {
    items: BTreeMap<i32, Item>,
    authors: BTreeMap<i32, Author>,
    publishers: BTreeMap<i32, Publisher>,
    patrons: BTreeMap<i32, Patron>,
    staff: BTreeMap<i32, Staff>,
    loans: BTreeMap<i32, LoanRecord>,
    last_id: i32,
}

impl MemoryState {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn open_loan(&self, item_id: i32) -> Option<&LoanRecord> {
        self.loans
            .values()
            .find(|l| l.item_id == item_id && l.status == LoanStatus::Open)
    }

    /// Attach derived availability and author/publisher references
    fn hydrate_item(&self, item: &Item) -> Item {
        let mut item = item.clone();
        item.available = self.open_loan(item.id).is_none();
        item.author = item
            .author_id
            .and_then(|id| self.authors.get(&id))
            .map(AuthorShort::from);
        item.publisher = item
            .publisher_id
            .and_then(|id| self.publishers.get(&id))
            .map(PublisherShort::from);
        item
    }

    fn hydrate_patron(&self, patron: &Patron) -> Patron {
        let mut patron = patron.clone();
        patron.active_loan_count = self
            .loans
            .values()
            .filter(|l| l.patron_id == patron.id && l.status == LoanStatus::Open)
            .count() as i64;
        patron
    }

    fn entry(&self, record: &LoanRecord) -> Option<LoanEntry> {
        let item = self.items.get(&record.item_id)?;
        let patron = self.patrons.get(&record.patron_id)?;
        Some(LoanEntry {
            record: record.clone(),
            item: item.short(),
            patron: patron.short(),
        })
    }

    /// Entries ordered newest `issued_at` first
    fn entries<'a>(&self, records: impl Iterator<Item = &'a LoanRecord>) -> Vec<LoanEntry> {
        let mut entries: Vec<LoanEntry> = records.filter_map(|r| self.entry(r)).collect();
        entries.sort_by(|a, b| {
            b.record
                .issued_at
                .cmp(&a.record.issued_at)
                .then(b.record.id.cmp(&a.record.id))
        });
        entries
    }

    fn item_matches(&self, item: &Item, term: &str) -> bool {
        let author = item
            .author_id
            .and_then(|id| self.authors.get(&id))
            .map(|a| a.last_name.as_str());
        let publisher = item
            .publisher_id
            .and_then(|id| self.publishers.get(&id))
            .map(|p| p.name.as_str());

        [
            Some(item.title.as_str()),
            Some(item.barcode.as_str()),
            item.isbn.as_deref(),
            author,
            publisher,
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(term))
    }

    fn max_code<'a>(codes: impl Iterator<Item = &'a str>) -> i64 {
        codes.filter_map(|c| c.parse::<i64>().ok()).max().unwrap_or(0)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn get(&self, id: i32) -> AppResult<Option<Item>> {
        let state = self.state.read().await;
        Ok(state.items.get(&id).map(|i| state.hydrate_item(i)))
    }

    async fn find_by_barcode(&self, barcode: &str) -> AppResult<Option<Item>> {
        let state = self.state.read().await;
        Ok(state
            .items
            .values()
            .find(|i| i.barcode == barcode)
            .map(|i| state.hydrate_item(i)))
    }

    async fn search(&self, query: &ItemQuery) -> AppResult<(Vec<Item>, i64)> {
        let (_, per_page, offset) = query.pagination();
        let term = query.search_term();
        let state = self.state.read().await;

        let mut matches: Vec<&Item> = state
            .items
            .values()
            .filter(|i| query.kind.map_or(true, |k| i.kind == k))
            .filter(|i| term.as_deref().map_or(true, |t| state.item_matches(i, t)))
            .collect();
        matches.sort_by(|a, b| cmp_codes(&a.code, &b.code));

        let total = matches.len() as i64;
        let page = matches
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(per_page as usize)
            .map(|i| state.hydrate_item(i))
            .collect();

        Ok((page, total))
    }

    async fn create(&self, item: &CreateItem, created_by: i32) -> AppResult<Item> {
        let mut state = self.state.write().await;

        if state.items.values().any(|i| i.barcode == item.barcode) {
            return Err(AppError::Conflict(format!(
                "Item with barcode {} already exists",
                item.barcode
            )));
        }
        let author_missing = item.author_id.is_some_and(|id| !state.authors.contains_key(&id));
        let publisher_missing = item
            .publisher_id
            .is_some_and(|id| !state.publishers.contains_key(&id));
        if author_missing || publisher_missing || !state.staff.contains_key(&created_by) {
            return Err(AppError::NotFound(
                "Author, publisher or staff member not found".to_string(),
            ));
        }

        let code = next_code(MemoryState::max_code(
            state.items.values().map(|i| i.code.as_str()),
        ));
        let id = state.next_id();
        let record = Item {
            id,
            kind: item.kind,
            code,
            barcode: item.barcode.clone(),
            title: item.title.clone(),
            short_title: item.short_title.clone(),
            isbn: item.isbn.clone(),
            publication_year: item.publication_year,
            location: item.location.clone(),
            author_id: item.author_id,
            publisher_id: item.publisher_id,
            author: None,
            publisher: None,
            created_at: Utc::now(),
            created_by: Some(created_by),
            available: true,
        };
        let hydrated = state.hydrate_item(&record);
        state.items.insert(id, record);
        Ok(hydrated)
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.state.read().await.items.len() as i64)
    }

    async fn create_author(&self, author: &CreateAuthor) -> AppResult<Author> {
        let mut state = self.state.write().await;
        let code = next_code(MemoryState::max_code(
            state.authors.values().map(|a| a.code.as_str()),
        ));
        let id = state.next_id();
        let record = Author {
            id,
            code,
            last_name: author.last_name.clone(),
            first_name: author.first_name.clone(),
            middle_name: author.middle_name.clone(),
            created_at: Utc::now(),
        };
        state.authors.insert(id, record.clone());
        Ok(record)
    }

    async fn create_publisher(&self, publisher: &CreatePublisher) -> AppResult<Publisher> {
        let mut state = self.state.write().await;
        let code = next_code(MemoryState::max_code(
            state.publishers.values().map(|p| p.code.as_str()),
        ));
        let id = state.next_id();
        let record = Publisher {
            id,
            code,
            name: publisher.name.clone(),
            created_at: Utc::now(),
        };
        state.publishers.insert(id, record.clone());
        Ok(record)
    }

    async fn list_authors(&self) -> AppResult<Vec<Author>> {
        let state = self.state.read().await;
        let mut authors: Vec<Author> = state.authors.values().cloned().collect();
        authors.sort_by(|a, b| {
            a.last_name
                .cmp(&b.last_name)
                .then_with(|| a.first_name.cmp(&b.first_name))
                .then(a.id.cmp(&b.id))
        });
        Ok(authors)
    }

    async fn list_publishers(&self) -> AppResult<Vec<Publisher>> {
        let state = self.state.read().await;
        let mut publishers: Vec<Publisher> = state.publishers.values().cloned().collect();
        publishers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(publishers)
    }
}

#[async_trait]
impl PatronStore for MemoryStore {
    async fn get(&self, id: i32) -> AppResult<Option<Patron>> {
        let state = self.state.read().await;
        Ok(state.patrons.get(&id).map(|p| state.hydrate_patron(p)))
    }

    async fn find_by_barcode(&self, barcode: &str) -> AppResult<Option<Patron>> {
        let state = self.state.read().await;
        Ok(state
            .patrons
            .values()
            .find(|p| p.barcode == barcode)
            .map(|p| state.hydrate_patron(p)))
    }

    async fn search(&self, query: &PatronQuery) -> AppResult<(Vec<Patron>, i64)> {
        let (_, per_page, offset) = query.pagination();
        let term = query.search_term();
        let state = self.state.read().await;

        let mut matches: Vec<&Patron> = state
            .patrons
            .values()
            .filter(|p| {
                term.as_deref().map_or(true, |t| {
                    [
                        Some(p.last_name.as_str()),
                        Some(p.first_name.as_str()),
                        Some(p.barcode.as_str()),
                        p.phone.as_deref(),
                    ]
                    .into_iter()
                    .flatten()
                    .any(|field| field.to_lowercase().contains(t))
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            a.last_name
                .cmp(&b.last_name)
                .then_with(|| a.first_name.cmp(&b.first_name))
                .then(a.id.cmp(&b.id))
        });

        let total = matches.len() as i64;
        let page = matches
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(per_page as usize)
            .map(|p| state.hydrate_patron(p))
            .collect();

        Ok((page, total))
    }

    async fn create(&self, patron: &CreatePatron, created_by: i32) -> AppResult<Patron> {
        let mut state = self.state.write().await;

        if state.patrons.values().any(|p| p.barcode == patron.barcode) {
            return Err(AppError::Conflict(format!(
                "Patron with barcode {} already exists",
                patron.barcode
            )));
        }
        if !state.staff.contains_key(&created_by) {
            return Err(AppError::NotFound("Staff member not found".to_string()));
        }

        let code = next_code(MemoryState::max_code(
            state.patrons.values().map(|p| p.code.as_str()),
        ));
        let id = state.next_id();
        let record = Patron {
            id,
            code,
            barcode: patron.barcode.clone(),
            last_name: patron.last_name.clone(),
            first_name: patron.first_name.clone(),
            middle_name: patron.middle_name.clone(),
            user_type: patron
                .user_type
                .clone()
                .unwrap_or_else(|| "student".to_string()),
            grade: patron.grade,
            phone: patron.phone.clone(),
            email: patron.email.clone(),
            comments: patron.comments.clone(),
            created_at: Utc::now(),
            created_by: Some(created_by),
            active_loan_count: 0,
        };
        state.patrons.insert(id, record.clone());
        Ok(record)
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.state.read().await.patrons.len() as i64)
    }
}

#[async_trait]
impl StaffStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> AppResult<Option<Staff>> {
        let state = self.state.read().await;
        Ok(state.staff.values().find(|s| s.username == username).cloned())
    }

    async fn create(&self, staff: &CreateStaff) -> AppResult<Staff> {
        let mut state = self.state.write().await;
        if state.staff.values().any(|s| s.username == staff.username) {
            return Err(AppError::Conflict(format!(
                "Username {} already exists",
                staff.username
            )));
        }
        let id = state.next_id();
        let record = Staff {
            id,
            username: staff.username.clone(),
            password_hash: staff.password_hash.clone(),
            full_name: staff.full_name.clone(),
            role: staff.role,
            created_at: Utc::now(),
        };
        state.staff.insert(id, record.clone());
        Ok(record)
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.state.read().await.staff.len() as i64)
    }
}

#[async_trait]
impl LoanStore for MemoryStore {
    async fn insert_open(&self, loan: &NewLoan) -> AppResult<LoanRecord> {
        let mut state = self.state.write().await;

        if !state.items.contains_key(&loan.item_id)
            || !state.patrons.contains_key(&loan.patron_id)
            || !state.staff.contains_key(&loan.issued_by)
        {
            return Err(AppError::NotFound(
                "Item, patron or staff member not found".to_string(),
            ));
        }
        if state.open_loan(loan.item_id).is_some() {
            return Err(AppError::Conflict(format!(
                "Item {} already has an open loan",
                loan.item_id
            )));
        }

        let id = state.next_id();
        let record = LoanRecord {
            id,
            item_id: loan.item_id,
            patron_id: loan.patron_id,
            issued_at: loan.issued_at,
            returned_at: None,
            issued_by: loan.issued_by,
            returned_by: None,
            status: LoanStatus::Open,
        };
        state.loans.insert(id, record.clone());
        Ok(record)
    }

    async fn close_open(
        &self,
        item_id: i32,
        returned_by: i32,
        returned_at: DateTime<Utc>,
    ) -> AppResult<Option<LoanRecord>> {
        let mut state = self.state.write().await;

        if !state.staff.contains_key(&returned_by) {
            return Err(AppError::NotFound("Staff member not found".to_string()));
        }

        let record = state
            .loans
            .values_mut()
            .find(|l| l.item_id == item_id && l.status == LoanStatus::Open);

        Ok(record.map(|record| {
            record.returned_at = Some(returned_at);
            record.returned_by = Some(returned_by);
            record.status = LoanStatus::Closed;
            record.clone()
        }))
    }

    async fn find_open_by_item(&self, item_id: i32) -> AppResult<Option<LoanRecord>> {
        Ok(self.state.read().await.open_loan(item_id).cloned())
    }

    async fn history(&self, filter: &HistoryFilter) -> AppResult<Vec<LoanEntry>> {
        let state = self.state.read().await;
        Ok(state.entries(state.loans.values().filter(|l| filter.matches(l))))
    }

    async fn active(&self, search: Option<String>) -> AppResult<Vec<LoanEntry>> {
        let state = self.state.read().await;
        let entries = state.entries(
            state
                .loans
                .values()
                .filter(|l| l.status == LoanStatus::Open),
        );

        Ok(match search {
            None => entries,
            Some(term) => entries
                .into_iter()
                .filter(|e| {
                    let patron = state.patrons.get(&e.patron.id);
                    [
                        Some(e.item.title.as_str()),
                        Some(e.item.barcode.as_str()),
                        patron.map(|p| p.last_name.as_str()),
                        patron.map(|p| p.first_name.as_str()),
                        Some(e.patron.barcode.as_str()),
                    ]
                    .into_iter()
                    .flatten()
                    .any(|field| field.to_lowercase().contains(&term))
                        || patron.is_some_and(|p| p.display_name().to_lowercase().contains(&term))
                })
                .collect(),
        })
    }

    async fn count_open(&self) -> AppResult<i64> {
        let state = self.state.read().await;
        Ok(state.loans.values().filter(|l| l.is_open()).count() as i64)
    }

    async fn count_items_on_loan(&self) -> AppResult<i64> {
        let state = self.state.read().await;
        let mut items: Vec<i32> = state
            .loans
            .values()
            .filter(|l| l.is_open())
            .map(|l| l.item_id)
            .collect();
        items.sort_unstable();
        items.dedup();
        Ok(items.len() as i64)
    }

    async fn count_issued_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .loans
            .values()
            .filter(|l| l.issued_at >= start && l.issued_at < end)
            .count() as i64)
    }

    async fn count_returned_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .loans
            .values()
            .filter(|l| l.status == LoanStatus::Closed)
            .filter(|l| l.returned_at.is_some_and(|at| at >= start && at < end))
            .count() as i64)
    }

    async fn count_open_issued_before(&self, cutoff: DateTime<Utc>) -> AppResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .loans
            .values()
            .filter(|l| l.is_open() && l.issued_at < cutoff)
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{item::ItemKind, staff::StaffRole};
    use chrono::Duration;

    async fn seeded() -> (MemoryStore, Staff, Item, Patron) {
        let store = MemoryStore::default();
        let staff = StaffStore::create(
            &store,
            &CreateStaff {
                username: "desk".to_string(),
                password_hash: String::new(),
                full_name: "Front Desk".to_string(),
                role: StaffRole::Librarian,
            },
        )
        .await
        .unwrap();
        let item = ItemStore::create(
            &store,
            &CreateItem {
                kind: ItemKind::Book,
                barcode: "B1".to_string(),
                title: "War and Peace".to_string(),
                short_title: None,
                isbn: Some("978-5-17-090335-2".to_string()),
                publication_year: Some(1869),
                location: None,
                author_id: None,
                publisher_id: None,
            },
            staff.id,
        )
        .await
        .unwrap();
        let patron = PatronStore::create(
            &store,
            &CreatePatron {
                barcode: "P1".to_string(),
                last_name: "Petrova".to_string(),
                first_name: "Anna".to_string(),
                middle_name: None,
                user_type: None,
                grade: Some(7),
                phone: None,
                email: None,
                comments: None,
            },
            staff.id,
        )
        .await
        .unwrap();
        (store, staff, item, patron)
    }

    #[tokio::test]
    async fn test_insert_open_rejects_second_open_loan() {
        let (store, staff, item, patron) = seeded().await;
        let loan = NewLoan {
            item_id: item.id,
            patron_id: patron.id,
            issued_by: staff.id,
            issued_at: Utc::now(),
        };

        store.insert_open(&loan).await.unwrap();
        let err = store.insert_open(&loan).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.count_open().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_open_requires_existing_references() {
        let (store, staff, item, _) = seeded().await;
        let err = store
            .insert_open(&NewLoan {
                item_id: item.id,
                patron_id: 9999,
                issued_by: staff.id,
                issued_at: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_close_open_without_loan_is_none() {
        let (store, staff, item, _) = seeded().await;
        let closed = store.close_open(item.id, staff.id, Utc::now()).await.unwrap();
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn test_availability_and_patron_count_are_derived() {
        let (store, staff, item, patron) = seeded().await;
        assert!(ItemStore::get(&store, item.id).await.unwrap().unwrap().available);

        store
            .insert_open(&NewLoan {
                item_id: item.id,
                patron_id: patron.id,
                issued_by: staff.id,
                issued_at: Utc::now(),
            })
            .await
            .unwrap();

        let item = ItemStore::find_by_barcode(&store, "B1").await.unwrap().unwrap();
        assert!(!item.available);
        let patron = PatronStore::find_by_barcode(&store, "P1").await.unwrap().unwrap();
        assert_eq!(patron.active_loan_count, 1);
    }

    #[tokio::test]
    async fn test_barcode_lookup_is_case_sensitive() {
        let (store, _, _, _) = seeded().await;
        assert!(ItemStore::find_by_barcode(&store, "b1").await.unwrap().is_none());
        assert!(PatronStore::find_by_barcode(&store, "p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_barcode_conflicts() {
        let (store, staff, _, _) = seeded().await;
        let err = ItemStore::create(
            &store,
            &CreateItem {
                kind: ItemKind::Disk,
                barcode: "B1".to_string(),
                title: "Another".to_string(),
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
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let (store, staff, item, patron) = seeded().await;
        let t0 = Utc::now() - Duration::days(10);

        for offset in [0, 5] {
            store
                .insert_open(&NewLoan {
                    item_id: item.id,
                    patron_id: patron.id,
                    issued_by: staff.id,
                    issued_at: t0 + Duration::days(offset),
                })
                .await
                .unwrap();
            store
                .close_open(item.id, staff.id, t0 + Duration::days(offset + 1))
                .await
                .unwrap();
        }

        let history = store.history(&HistoryFilter::default()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].record.issued_at > history[1].record.issued_at);
        assert!(history.iter().all(|e| e.record.status == LoanStatus::Closed));
    }

    #[tokio::test]
    async fn test_patron_search_orders_and_pages() {
        let (store, staff, item, first) = seeded().await;
        for (barcode, last_name, phone) in [("P2", "Orlov", Some("555-0101")), ("P3", "Ivanov", None)] {
            PatronStore::create(
                &store,
                &CreatePatron {
                    barcode: barcode.to_string(),
                    last_name: last_name.to_string(),
                    first_name: "Ivan".to_string(),
                    middle_name: None,
                    user_type: None,
                    grade: None,
                    phone: phone.map(str::to_string),
                    email: None,
                    comments: None,
                },
                staff.id,
            )
            .await
            .unwrap();
        }
        store
            .insert_open(&NewLoan {
                item_id: item.id,
                patron_id: first.id,
                issued_by: staff.id,
                issued_at: Utc::now(),
            })
            .await
            .unwrap();

        let (all, total) = PatronStore::search(&store, &PatronQuery::default()).await.unwrap();
        assert_eq!(total, 3);
        let names: Vec<&str> = all.iter().map(|p| p.last_name.as_str()).collect();
        assert_eq!(names, vec!["Ivanov", "Orlov", "Petrova"]);
        assert_eq!(all[2].active_loan_count, 1);

        let (by_phone, total) = PatronStore::search(
            &store,
            &PatronQuery {
                search: Some("0101".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(by_phone[0].barcode, "P2");

        let (second_page, total) = PatronStore::search(
            &store,
            &PatronQuery {
                page: Some(2),
                per_page: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(total, 3);
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].last_name, "Petrova");
    }

    #[tokio::test]
    async fn test_author_and_publisher_listings_are_sorted() {
        let store = MemoryStore::default();
        for (last_name, first_name) in [("Tolstoy", "Lev"), ("Chekhov", "Anton"), ("Tolstoy", "Aleksey")] {
            store
                .create_author(&CreateAuthor {
                    last_name: last_name.to_string(),
                    first_name: Some(first_name.to_string()),
                    middle_name: None,
                })
                .await
                .unwrap();
        }
        for name in ["Prosveshchenie", "Eksmo"] {
            store
                .create_publisher(&CreatePublisher {
                    name: name.to_string(),
                })
                .await
                .unwrap();
        }

        let authors = store.list_authors().await.unwrap();
        let names: Vec<(&str, Option<&str>)> = authors
            .iter()
            .map(|a| (a.last_name.as_str(), a.first_name.as_deref()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Chekhov", Some("Anton")),
                ("Tolstoy", Some("Aleksey")),
                ("Tolstoy", Some("Lev")),
            ]
        );

        let publishers = store.list_publishers().await.unwrap();
        assert_eq!(publishers[0].name, "Eksmo");
        assert_eq!(publishers[1].name, "Prosveshchenie");
    }
}
