use anyhow::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::domain::{AccountId, UsageKind};
use crate::models::account::{Account, ValidatedDraft, ValidatedPatch};

pub mod migrator;
pub mod repositories;

pub use repositories::account::{StoreError, UniqueField};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    // ========== Account Repository Methods ==========

    #[must_use]
    pub fn account_repo(&self) -> repositories::account::AccountRepository {
        repositories::account::AccountRepository::new(self.conn.clone())
    }

    pub async fn create_account(
        &self,
        draft: &ValidatedDraft,
        password_hash: String,
    ) -> Result<Account, StoreError> {
        self.account_repo().create(draft, password_hash).await
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        self.account_repo().get(id).await
    }

    pub async fn find_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, StoreError> {
        self.account_repo().find_by_username(username).await
    }

    pub async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        self.account_repo().find_by_email(email).await
    }

    pub async fn update_account(
        &self,
        id: AccountId,
        patch: &ValidatedPatch,
        new_hash: Option<String>,
    ) -> Result<Account, StoreError> {
        self.account_repo().update(id, patch, new_hash).await
    }

    pub async fn increment_account_usage(
        &self,
        id: AccountId,
        kind: UsageKind,
    ) -> Result<(), StoreError> {
        self.account_repo().increment_usage(id, kind).await
    }
}
