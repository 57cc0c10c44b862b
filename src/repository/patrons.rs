//! Patrons repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{
    error::{map_constraint_error, AppError, AppResult},
    models::patron::{CreatePatron, Patron, PatronQuery},
};

use super::{items::next_code_sql, like_pattern, PatronStore};

const PATRON_SELECT: &str = r#"
    SELECT r.id, r.code, r.barcode, r.last_name, r.first_name, r.middle_name,
           r.user_type, r.grade, r.phone, r.email, r.comments,
           r.created_at, r.created_by,
           (SELECT COUNT(*) FROM loans l
            WHERE l.patron_id = r.id AND l.status = 'open') AS active_loan_count
    FROM patrons r
"#;

const SEARCH_WHERE: &str = r#"
    WHERE ($1::text IS NULL
           OR LOWER(r.last_name) LIKE $1
           OR LOWER(r.first_name) LIKE $1
           OR LOWER(r.barcode) LIKE $1
           OR LOWER(r.phone) LIKE $1)
"#;

#[derive(Clone)]
pub struct PatronsRepository {
    pool: Pool<Postgres>,
}

impl PatronsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PatronStore for PatronsRepository {
    async fn get(&self, id: i32) -> AppResult<Option<Patron>> {
        let sql = format!("{} WHERE r.id = $1", PATRON_SELECT);
        let patron = sqlx::query_as::<_, Patron>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(patron)
    }

    async fn find_by_barcode(&self, barcode: &str) -> AppResult<Option<Patron>> {
        let sql = format!("{} WHERE r.barcode = $1", PATRON_SELECT);
        let patron = sqlx::query_as::<_, Patron>(&sql)
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?;
        Ok(patron)
    }

    async fn search(&self, query: &PatronQuery) -> AppResult<(Vec<Patron>, i64)> {
        let (_, per_page, offset) = query.pagination();
        let pattern = query.search_term().map(|t| like_pattern(&t));

        let count_sql = format!("SELECT COUNT(*) FROM patrons r {}", SEARCH_WHERE);
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await?;

        let select_sql = format!(
            "{} {} ORDER BY r.last_name, r.first_name, r.id LIMIT $2 OFFSET $3",
            PATRON_SELECT, SEARCH_WHERE
        );
        let patrons = sqlx::query_as::<_, Patron>(&select_sql)
            .bind(&pattern)
            .bind(per_page)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok((patrons, total))
    }

    async fn create(&self, patron: &CreatePatron, created_by: i32) -> AppResult<Patron> {
        let sql = concat!(
            "INSERT INTO patrons (code, barcode, last_name, first_name, middle_name, user_type, ",
            "grade, phone, email, comments, created_by) VALUES (",
            next_code_sql!("patrons"),
            ", $1, $2, $3, $4, COALESCE($5, 'student'), $6, $7, $8, $9, $10) RETURNING id"
        );

        let id: i32 = sqlx::query_scalar(sql)
            .bind(&patron.barcode)
            .bind(&patron.last_name)
            .bind(&patron.first_name)
            .bind(&patron.middle_name)
            .bind(&patron.user_type)
            .bind(patron.grade)
            .bind(&patron.phone)
            .bind(&patron.email)
            .bind(&patron.comments)
            .bind(created_by)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                map_constraint_error(
                    e,
                    &format!("Patron with barcode {} already exists", patron.barcode),
                    "Staff member not found",
                )
            })?;

        self.get(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Patron {} vanished after insert", id)))
    }

    async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM patrons")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
