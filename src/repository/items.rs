//! Items repository for database operations

use async_trait::async_trait;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};

use crate::{
    error::{map_constraint_error, AppError, AppResult},
    models::{
        author::{Author, AuthorShort, CreateAuthor, CreatePublisher, Publisher, PublisherShort},
        item::{CreateItem, Item, ItemQuery},
    },
};

use super::{like_pattern, ItemStore};

/// Item columns joined with author, publisher and derived availability
const ITEM_SELECT: &str = r#"
    SELECT i.id, i.kind, i.code, i.barcode, i.title, i.short_title, i.isbn,
           i.publication_year, i.location, i.author_id, i.publisher_id,
           i.created_at, i.created_by,
           a.last_name AS author_last_name, a.first_name AS author_first_name,
           p.name AS publisher_name,
           NOT EXISTS (
               SELECT 1 FROM loans l
               WHERE l.item_id = i.id AND l.status = 'open'
           ) AS available
    FROM items i
    LEFT JOIN authors a ON a.id = i.author_id
    LEFT JOIN publishers p ON p.id = i.publisher_id
"#;

const SEARCH_WHERE: &str = r#"
    WHERE ($1::text IS NULL
           OR LOWER(i.title) LIKE $1
           OR LOWER(i.barcode) LIKE $1
           OR LOWER(i.isbn) LIKE $1
           OR LOWER(a.last_name) LIKE $1
           OR LOWER(p.name) LIKE $1)
      AND ($2::text IS NULL OR i.kind = $2)
"#;

/// Next zero-padded sequential code for a table with a numeric `code` column
macro_rules! next_code_sql {
    ($table:literal) => {
        concat!(
            "(SELECT lpad((COALESCE(MAX(code::bigint), 0) + 1)::text, 6, '0') FROM ",
            $table,
            " WHERE code ~ '^[0-9]+$')"
        )
    };
}
pub(crate) use next_code_sql;

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    let author_id: Option<i32> = row.try_get("author_id")?;
    let publisher_id: Option<i32> = row.try_get("publisher_id")?;

    let author = match (author_id, row.try_get::<Option<String>, _>("author_last_name")?) {
        (Some(id), Some(last_name)) => Some(AuthorShort {
            id,
            last_name,
            first_name: row.try_get("author_first_name")?,
        }),
        _ => None,
    };
    let publisher = match (publisher_id, row.try_get::<Option<String>, _>("publisher_name")?) {
        (Some(id), Some(name)) => Some(PublisherShort { id, name }),
        _ => None,
    };

    Ok(Item {
        id: row.try_get("id")?,
        kind: row.try_get("kind")?,
        code: row.try_get("code")?,
        barcode: row.try_get("barcode")?,
        title: row.try_get("title")?,
        short_title: row.try_get("short_title")?,
        isbn: row.try_get("isbn")?,
        publication_year: row.try_get("publication_year")?,
        location: row.try_get("location")?,
        author_id,
        publisher_id,
        author,
        publisher,
        created_at: row.try_get("created_at")?,
        created_by: row.try_get("created_by")?,
        available: row.try_get("available")?,
    })
}

#[derive(Clone)]
pub struct ItemsRepository {
    pool: Pool<Postgres>,
}

impl ItemsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn decode_optional(row: Option<PgRow>) -> AppResult<Option<Item>> {
    row.map(|r| item_from_row(&r))
        .transpose()
        .map_err(AppError::from)
}

#[async_trait]
impl ItemStore for ItemsRepository {
    async fn get(&self, id: i32) -> AppResult<Option<Item>> {
        let sql = format!("{} WHERE i.id = $1", ITEM_SELECT);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        decode_optional(row)
    }

    async fn find_by_barcode(&self, barcode: &str) -> AppResult<Option<Item>> {
        let sql = format!("{} WHERE i.barcode = $1", ITEM_SELECT);
        let row = sqlx::query(&sql)
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?;
        decode_optional(row)
    }

    async fn search(&self, query: &ItemQuery) -> AppResult<(Vec<Item>, i64)> {
        let (_, per_page, offset) = query.pagination();
        let pattern = query.search_term().map(|t| like_pattern(&t));

        let count_sql = format!(
            r#"SELECT COUNT(*) FROM items i
               LEFT JOIN authors a ON a.id = i.author_id
               LEFT JOIN publishers p ON p.id = i.publisher_id
               {}"#,
            SEARCH_WHERE
        );
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(&pattern)
            .bind(query.kind)
            .fetch_one(&self.pool)
            .await?;

        let select_sql = format!(
            "{} {} ORDER BY LENGTH(i.code) ASC, i.code ASC LIMIT $3 OFFSET $4",
            ITEM_SELECT, SEARCH_WHERE
        );
        let rows = sqlx::query(&select_sql)
            .bind(&pattern)
            .bind(query.kind)
            .bind(per_page)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .iter()
            .filter_map(|row| match item_from_row(row) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!("Skipping undecodable item row: {}", e);
                    None
                }
            })
            .collect();

        Ok((items, total))
    }

    async fn create(&self, item: &CreateItem, created_by: i32) -> AppResult<Item> {
        let sql = concat!(
            "INSERT INTO items (kind, code, barcode, title, short_title, isbn, publication_year, ",
            "location, author_id, publisher_id, created_by) ",
            "VALUES ($1, ",
            next_code_sql!("items"),
            ", $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING id"
        );

        let id: i32 = sqlx::query_scalar(sql)
            .bind(item.kind)
            .bind(&item.barcode)
            .bind(&item.title)
            .bind(&item.short_title)
            .bind(&item.isbn)
            .bind(item.publication_year)
            .bind(&item.location)
            .bind(item.author_id)
            .bind(item.publisher_id)
            .bind(created_by)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                map_constraint_error(
                    e,
                    &format!("Item with barcode {} already exists", item.barcode),
                    "Author, publisher or staff member not found",
                )
            })?;

        self.get(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Item {} vanished after insert", id)))
    }

    async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn create_author(&self, author: &CreateAuthor) -> AppResult<Author> {
        let sql = concat!(
            "INSERT INTO authors (code, last_name, first_name, middle_name) VALUES (",
            next_code_sql!("authors"),
            ", $1, $2, $3) RETURNING id, code, last_name, first_name, middle_name, created_at"
        );
        sqlx::query_as::<_, Author>(sql)
            .bind(&author.last_name)
            .bind(&author.first_name)
            .bind(&author.middle_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_constraint_error(e, "Author code already taken, retry", "Author not found"))
    }

    async fn create_publisher(&self, publisher: &CreatePublisher) -> AppResult<Publisher> {
        let sql = concat!(
            "INSERT INTO publishers (code, name) VALUES (",
            next_code_sql!("publishers"),
            ", $1) RETURNING id, code, name, created_at"
        );
        sqlx::query_as::<_, Publisher>(sql)
            .bind(&publisher.name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                map_constraint_error(e, "Publisher code already taken, retry", "Publisher not found")
            })
    }

    async fn list_authors(&self) -> AppResult<Vec<Author>> {
        let authors = sqlx::query_as::<_, Author>(
            r#"SELECT id, code, last_name, first_name, middle_name, created_at
               FROM authors
               ORDER BY last_name, first_name NULLS FIRST, id"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(authors)
    }

    async fn list_publishers(&self) -> AppResult<Vec<Publisher>> {
        let publishers = sqlx::query_as::<_, Publisher>(
            "SELECT id, code, name, created_at FROM publishers ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(publishers)
    }
}
