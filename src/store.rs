//! Read-only access to user records for the password flow
//!
//! Provisioning and password resets happen outside this service; the gateway
//! only looks users up by email.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::error::AuthError;
use crate::settings::DatabaseSettings;

/// A row of `backend.users`
#[derive(Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub photo_url: Option<String>,
    pub provider: Option<String>,
    pub provider_id: Option<String>,
    pub hashed_password: Option<String>,
}

impl UserRecord {
    /// Name shown to the user, falling back to the email address
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("has_password", &self.hashed_password.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by email address
    ///
    /// # Errors
    ///
    /// Returns `AuthError::CredentialStore` if the backing store cannot be queried
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthError>;
}

/// Postgres-backed store reading the `backend.users` table
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Build a lazily connecting pool; the first lookup opens the connection
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the connection string cannot be parsed
    pub fn connect_lazy(settings: &DatabaseSettings, url: &str) -> Result<Self, AuthError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_seconds))
            .connect_lazy(url)
            .map_err(|e| AuthError::Configuration(format!("invalid DATABASE_URL: {e}")))?;

        Ok(Self { pool })
    }

    fn record_from_row(row: &PgRow) -> Result<UserRecord, sqlx::Error> {
        Ok(UserRecord {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            photo_url: row.try_get("photo_url")?,
            provider: row.try_get("provider")?,
            provider_id: row.try_get("provider_id")?,
            hashed_password: row.try_get("hashed_password")?,
        })
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthError> {
        let row = sqlx::query(
            "SELECT id, email, name, photo_url, provider, provider_id, hashed_password \
             FROM backend.users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::CredentialStore(e.to_string()))?;

        row.as_ref()
            .map(Self::record_from_row)
            .transpose()
            .map_err(|e| AuthError::CredentialStore(e.to_string()))
    }
}

/// In-process store, used when no database is configured and in tests
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserStore {
    users: HashMap<String, UserRecord>,
}

impl InMemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_user(mut self, user: UserRecord) -> Self {
        self.users.insert(user.email.clone(), user);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthError> {
        let user = self.users.get(email).cloned();
        debug!("In-memory user lookup: found={}", user.is_some());
        Ok(user)
    }
}
