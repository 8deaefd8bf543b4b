//! `SeaORM` implementation of the `AccountService` trait.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Store;
use crate::domain::{AccountId, UsageKind};
use crate::models::account::{Account, AccountDraft, AccountPatch};
use crate::services::account_service::{AccountError, AccountService};
use crate::services::password::{CredentialHasher, HashError, Verification, needs_rehash};
use crate::services::validation::{Validator, normalize_email, normalize_username};

#[derive(Clone)]
pub struct SeaOrmAccountService {
    store: Store,
    hasher: CredentialHasher,
    validator: Validator,
}

impl SeaOrmAccountService {
    #[must_use]
    pub const fn new(store: Store, hasher: CredentialHasher, validator: Validator) -> Self {
        Self {
            store,
            hasher,
            validator,
        }
    }

    pub fn from_config(store: Store, config: &Config) -> Result<Self, HashError> {
        let hasher = CredentialHasher::new(&config.security)?;
        let validator = Validator::new(config.accounts.default_role);
        Ok(Self::new(store, hasher, validator))
    }

    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Fires a usage increment without making the caller wait for it.
    /// Failures are logged; the handle may be awaited or dropped.
    pub fn record_usage_detached(&self, id: AccountId, kind: UsageKind) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.record_usage(id, kind).await {
                warn!(account_id = %id, kind = %kind, error = %e, "Failed to record usage");
            }
        })
    }

    async fn resolve_identifier(&self, identifier: &str) -> Result<Option<Account>, AccountError> {
        let username = normalize_username(identifier);
        if username.is_empty() {
            return Ok(None);
        }

        if let Some(account) = self.store.find_account_by_username(&username).await? {
            return Ok(Some(account));
        }

        if username.contains('@') {
            return Ok(self
                .store
                .find_account_by_email(&normalize_email(identifier))
                .await?);
        }

        Ok(None)
    }
}

fn auth_failed(reason: &'static str) -> AccountError {
    metrics::counter!("auth_attempts_total", "outcome" => reason).increment(1);
    AccountError::InvalidCredentials
}

#[async_trait]
impl AccountService for SeaOrmAccountService {
    async fn create_account(&self, draft: AccountDraft) -> Result<Account, AccountError> {
        let draft = self
            .validator
            .validate_new(draft)
            .map_err(AccountError::Validation)?;

        let password_hash = self.hasher.hash_off_thread(draft.password.clone()).await?;

        let account = self.store.create_account(&draft, password_hash).await?;

        metrics::counter!("accounts_created_total").increment(1);
        info!(account_id = %account.id, role = %account.role, "Account created");

        Ok(account)
    }

    async fn authenticate(
        &self,
        identifier: &str,
        plaintext: &str,
    ) -> Result<Account, AccountError> {
        let Some(account) = self.resolve_identifier(identifier).await? else {
            self.hasher.check_decoy(plaintext.to_string()).await?;
            return Err(auth_failed("unknown_identifier"));
        };

        let verification = self
            .hasher
            .check_off_thread(plaintext.to_string(), account.password_hash.clone())
            .await?;

        match verification {
            Verification::Match => {
                metrics::counter!("auth_attempts_total", "outcome" => "success").increment(1);
                info!(account_id = %account.id, "Account authenticated");
                Ok(account)
            }
            Verification::Mismatch => Err(auth_failed("wrong_password")),
            Verification::Malformed => {
                warn!(account_id = %account.id, "Stored credential could not be parsed");
                Err(auth_failed("malformed_hash"))
            }
        }
    }

    async fn update_account(
        &self,
        id: AccountId,
        patch: AccountPatch,
    ) -> Result<Account, AccountError> {
        let existing = self
            .store
            .get_account(id)
            .await?
            .ok_or(AccountError::NotFound)?;

        let patch = self
            .validator
            .validate_patch(&existing, patch)
            .map_err(AccountError::Validation)?;

        let new_hash = match &patch.password {
            Some(password) if needs_rehash(&patch) => {
                Some(self.hasher.hash_off_thread(password.clone()).await?)
            }
            _ => None,
        };
        let rehashed = new_hash.is_some();

        let account = self.store.update_account(id, &patch, new_hash).await?;

        info!(account_id = %id, rehashed, "Account updated");
        Ok(account)
    }

    async fn record_usage(&self, id: AccountId, kind: UsageKind) -> Result<(), AccountError> {
        self.store.increment_account_usage(id, kind).await?;
        metrics::counter!("account_usage_recorded_total", "kind" => kind.as_str()).increment(1);
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, AccountError> {
        self.store
            .get_account(id)
            .await?
            .ok_or(AccountError::NotFound)
    }

    async fn find_by_username(&self, username: &str) -> Result<Account, AccountError> {
        self.store
            .find_account_by_username(&normalize_username(username))
            .await?
            .ok_or(AccountError::NotFound)
    }
}
