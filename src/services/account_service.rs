//! Domain service for the account identity and credential lifecycle.
//!
//! Handles account creation, authentication, updates and usage telemetry.

use thiserror::Error;

use crate::db::{StoreError, UniqueField};
use crate::domain::{AccountId, UsageKind};
use crate::models::account::{Account, AccountDraft, AccountPatch};
use crate::services::password::HashError;
use crate::services::validation::ValidationError;

/// Errors specific to account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Validation failed: {}", summarize(.0))]
    Validation(Vec<ValidationError>),

    #[error("{field} is already taken")]
    Duplicate { field: UniqueField },

    #[error("Account not found")]
    NotFound,

    /// Deliberately the same for unknown identifiers and wrong passwords.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(field) => Self::Duplicate { field },
            StoreError::NotFound => Self::NotFound,
            StoreError::Database(e) => Self::Database(e.to_string()),
        }
    }
}

impl From<sea_orm::DbErr> for AccountError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<HashError> for AccountError {
    fn from(err: HashError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Domain service trait for accounts.
#[async_trait::async_trait]
pub trait AccountService: Send + Sync {
    /// Validates, hashes and stores a new account.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::Validation`] with every violation, or
    /// [`AccountError::Duplicate`] when the username or email is taken.
    async fn create_account(&self, draft: AccountDraft) -> Result<Account, AccountError>;

    /// Resolves `identifier` as a username or email and checks the password.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::InvalidCredentials`] for any failed login.
    async fn authenticate(&self, identifier: &str, plaintext: &str)
    -> Result<Account, AccountError>;

    /// Applies a patch. The stored hash is replaced only when the patch
    /// carries a password.
    async fn update_account(
        &self,
        id: AccountId,
        patch: AccountPatch,
    ) -> Result<Account, AccountError>;

    /// Atomically bumps one usage counter and touches `last_active`.
    async fn record_usage(&self, id: AccountId, kind: UsageKind) -> Result<(), AccountError>;

    async fn get_account(&self, id: AccountId) -> Result<Account, AccountError>;

    async fn find_by_username(&self, username: &str) -> Result<Account, AccountError>;
}
