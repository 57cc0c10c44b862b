//! Staff repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{
    error::{map_constraint_error, AppResult},
    models::staff::{CreateStaff, Staff},
};

use super::StaffStore;

#[derive(Clone)]
pub struct StaffRepository {
    pool: Pool<Postgres>,
}

impl StaffRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StaffStore for StaffRepository {
    async fn find_by_username(&self, username: &str) -> AppResult<Option<Staff>> {
        let staff = sqlx::query_as::<_, Staff>(
            "SELECT id, username, password_hash, full_name, role, created_at FROM staff WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(staff)
    }

    async fn create(&self, staff: &CreateStaff) -> AppResult<Staff> {
        sqlx::query_as::<_, Staff>(
            r#"
            INSERT INTO staff (username, password_hash, full_name, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, password_hash, full_name, role, created_at
            "#,
        )
        .bind(&staff.username)
        .bind(&staff.password_hash)
        .bind(&staff.full_name)
        .bind(staff.role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            map_constraint_error(
                e,
                &format!("Username {} already exists", staff.username),
                "Staff member not found",
            )
        })
    }

    async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM staff")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
