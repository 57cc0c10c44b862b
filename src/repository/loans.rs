//! Loans repository for database operations
//!
//! The partial unique index `loans_one_open_per_item` guarantees at most one
//! open record per item; a violating insert surfaces as `AppError::Conflict`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row};

use crate::{
    error::{map_constraint_error, AppResult},
    models::{
        item::ItemShort,
        loan::{HistoryFilter, LoanEntry, LoanRecord, NewLoan},
        patron::{display_name, PatronShort},
    },
};

use super::{like_pattern, LoanStore};

const LOAN_COLUMNS: &str =
    "id, item_id, patron_id, issued_at, returned_at, issued_by, returned_by, status";

/// Loans joined with the item and patron they reference
const ENTRY_SELECT: &str = r#"
    SELECT l.id, l.item_id, l.patron_id, l.issued_at, l.returned_at,
           l.issued_by, l.returned_by, l.status,
           i.kind AS item_kind, i.code AS item_code, i.barcode AS item_barcode,
           i.title AS item_title,
           r.barcode AS patron_barcode, r.last_name AS patron_last_name,
           r.first_name AS patron_first_name
    FROM loans l
    JOIN items i ON i.id = l.item_id
    JOIN patrons r ON r.id = l.patron_id
"#;

fn entry_from_row(row: &PgRow) -> Result<LoanEntry, sqlx::Error> {
    let record = LoanRecord {
        id: row.try_get("id")?,
        item_id: row.try_get("item_id")?,
        patron_id: row.try_get("patron_id")?,
        issued_at: row.try_get("issued_at")?,
        returned_at: row.try_get("returned_at")?,
        issued_by: row.try_get("issued_by")?,
        returned_by: row.try_get("returned_by")?,
        status: row.try_get("status")?,
    };
    let last_name: String = row.try_get("patron_last_name")?;
    let first_name: String = row.try_get("patron_first_name")?;

    Ok(LoanEntry {
        item: ItemShort {
            id: record.item_id,
            kind: row.try_get("item_kind")?,
            code: row.try_get("item_code")?,
            barcode: row.try_get("item_barcode")?,
            title: row.try_get("item_title")?,
        },
        patron: PatronShort {
            id: record.patron_id,
            barcode: row.try_get("patron_barcode")?,
            display_name: display_name(&last_name, &first_name),
        },
        record,
    })
}

/// Decode joined rows, skipping any that fail rather than failing the list
fn decode_entries(rows: Vec<PgRow>) -> Vec<LoanEntry> {
    rows.iter()
        .filter_map(|row| match entry_from_row(row) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping undecodable loan row: {}", e);
                None
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoanStore for LoansRepository {
    async fn insert_open(&self, loan: &NewLoan) -> AppResult<LoanRecord> {
        let sql = format!(
            r#"
            INSERT INTO loans (item_id, patron_id, issued_at, issued_by, status)
            VALUES ($1, $2, $3, $4, 'open')
            RETURNING {}
            "#,
            LOAN_COLUMNS
        );

        sqlx::query_as::<_, LoanRecord>(&sql)
            .bind(loan.item_id)
            .bind(loan.patron_id)
            .bind(loan.issued_at)
            .bind(loan.issued_by)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                map_constraint_error(
                    e,
                    &format!("Item {} already has an open loan", loan.item_id),
                    "Item, patron or staff member not found",
                )
            })
    }

    async fn close_open(
        &self,
        item_id: i32,
        returned_by: i32,
        returned_at: DateTime<Utc>,
    ) -> AppResult<Option<LoanRecord>> {
        let sql = format!(
            r#"
            UPDATE loans
            SET returned_at = $2, returned_by = $3, status = 'closed'
            WHERE item_id = $1 AND status = 'open'
            RETURNING {}
            "#,
            LOAN_COLUMNS
        );

        sqlx::query_as::<_, LoanRecord>(&sql)
            .bind(item_id)
            .bind(returned_at)
            .bind(returned_by)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_constraint_error(e, "Loan was modified concurrently", "Staff member not found"))
    }

    async fn find_open_by_item(&self, item_id: i32) -> AppResult<Option<LoanRecord>> {
        let sql = format!(
            "SELECT {} FROM loans WHERE item_id = $1 AND status = 'open'",
            LOAN_COLUMNS
        );
        let record = sqlx::query_as::<_, LoanRecord>(&sql)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn history(&self, filter: &HistoryFilter) -> AppResult<Vec<LoanEntry>> {
        let sql = format!(
            r#"{}
            WHERE ($1::int IS NULL OR l.item_id = $1)
              AND ($2::int IS NULL OR l.patron_id = $2)
              AND ($3::text IS NULL OR l.status = $3)
              AND ($4::timestamptz IS NULL OR l.issued_at >= $4)
              AND ($5::timestamptz IS NULL OR l.issued_at < $5)
            ORDER BY l.issued_at DESC, l.id DESC
            "#,
            ENTRY_SELECT
        );

        let rows = sqlx::query(&sql)
            .bind(filter.item_id)
            .bind(filter.patron_id)
            .bind(filter.status)
            .bind(filter.issued_from)
            .bind(filter.issued_before)
            .fetch_all(&self.pool)
            .await?;

        Ok(decode_entries(rows))
    }

    async fn active(&self, search: Option<String>) -> AppResult<Vec<LoanEntry>> {
        let pattern = search.map(|s| like_pattern(&s));
        let sql = format!(
            r#"{}
            WHERE l.status = 'open'
              AND ($1::text IS NULL
                   OR LOWER(i.title) LIKE $1
                   OR LOWER(i.barcode) LIKE $1
                   OR LOWER(r.last_name) LIKE $1
                   OR LOWER(r.first_name) LIKE $1
                   OR LOWER(TRIM(r.last_name || ' ' || r.first_name)) LIKE $1
                   OR LOWER(r.barcode) LIKE $1)
            ORDER BY l.issued_at DESC, l.id DESC
            "#,
            ENTRY_SELECT
        );

        let rows = sqlx::query(&sql)
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;

        Ok(decode_entries(rows))
    }

    async fn count_open(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE status = 'open'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_items_on_loan(&self) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT item_id) FROM loans WHERE status = 'open'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn count_issued_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE issued_at >= $1 AND issued_at < $2")
                .bind(start)
                .bind(end)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn count_returned_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loans WHERE status = 'closed' AND returned_at >= $1 AND returned_at < $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_open_issued_before(&self, cutoff: DateTime<Utc>) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE status = 'open' AND issued_at < $1")
                .bind(cutoff)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
