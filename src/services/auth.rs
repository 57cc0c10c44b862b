//! Staff authentication service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::staff::{CreateStaff, Staff, StaffClaims, StaffRole},
    repository::Repository,
};

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Authenticate staff by username and return a JWT token
    pub async fn login(&self, username: &str, password: &str) -> AppResult<(String, Staff)> {
        let staff = self
            .repository
            .staff
            .find_by_username(username)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid username or password".to_string()))?;

        if !verify_password(&staff.password_hash, password)? {
            tracing::warn!(username, "Rejected login attempt");
            return Err(AppError::Authentication("Invalid username or password".to_string()));
        }

        let token = StaffClaims::new(&staff, self.config.jwt_expiration_hours)
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))?;

        tracing::info!(staff_id = staff.id, "Staff logged in");
        Ok((token, staff))
    }

    /// Validate a bearer token against the configured secret
    pub fn verify_token(&self, token: &str) -> AppResult<StaffClaims> {
        StaffClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))
    }

    /// Staff account behind validated claims
    pub async fn current_staff(&self, claims: &StaffClaims) -> AppResult<Staff> {
        self.repository
            .staff
            .find_by_username(&claims.sub)
            .await?
            .filter(|staff| staff.id == claims.staff_id)
            .ok_or_else(|| AppError::Authentication("Staff account no longer exists".to_string()))
    }

    pub async fn create_staff(
        &self,
        username: &str,
        password: &str,
        full_name: &str,
        role: StaffRole,
    ) -> AppResult<Staff> {
        self.repository
            .staff
            .create(&CreateStaff {
                username: username.to_string(),
                password_hash: hash_password(password)?,
                full_name: full_name.to_string(),
                role,
            })
            .await
    }

    /// Create the configured admin account when the staff directory is empty
    pub async fn ensure_bootstrap_staff(&self) -> AppResult<Option<Staff>> {
        if self.repository.staff.count().await? > 0 {
            return Ok(None);
        }

        let staff = self
            .create_staff(
                &self.config.bootstrap_username,
                &self.config.bootstrap_password,
                "Administrator",
                StaffRole::Admin,
            )
            .await?;

        tracing::warn!(
            username = %staff.username,
            "No staff accounts found, created bootstrap administrator; change its password"
        );
        Ok(Some(staff))
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
