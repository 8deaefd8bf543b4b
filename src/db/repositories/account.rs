use chrono::Utc;
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
    SqlErr,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::domain::{AccountId, UsageKind};
use crate::entities::{accounts, prelude::*};
use crate::models::account::{Account, Preferences, ValidatedDraft, ValidatedPatch};

/// Column guarded by a unique constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UniqueField {
    Username,
    Email,
}

impl UniqueField {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} is already taken")]
    Duplicate(UniqueField),

    #[error("Account not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Turns a unique-constraint violation into the field that collided.
///
/// SQLite reports these as `UNIQUE constraint failed: accounts.<column>`.
fn map_write_err(err: DbErr) -> StoreError {
    if let Some(SqlErr::UniqueConstraintViolation(message)) = err.sql_err() {
        if message.contains("accounts.username") {
            return StoreError::Duplicate(UniqueField::Username);
        }
        if message.contains("accounts.email") {
            return StoreError::Duplicate(UniqueField::Email);
        }
    }
    StoreError::Database(err)
}

fn notification_settings_json(preferences: Option<&Preferences>) -> Option<serde_json::Value> {
    preferences
        .filter(|p| !p.notification_settings.is_empty())
        .and_then(|p| serde_json::to_value(&p.notification_settings).ok())
}

/// `notification_settings = json_patch(COALESCE(notification_settings, '{}'), ?)`
fn merge_notification_settings(
    channels: &BTreeMap<String, bool>,
) -> Result<SimpleExpr, StoreError> {
    let patch = serde_json::to_string(channels)
        .map_err(|e| StoreError::Database(DbErr::Custom(e.to_string())))?;
    Ok(Expr::cust_with_values(
        "json_patch(COALESCE(\"notification_settings\", '{}'), ?)",
        [patch],
    ))
}

pub struct AccountRepository {
    conn: DatabaseConnection,
}

impl AccountRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Inserts a new account. Uniqueness is left entirely to the table's
    /// constraints, so two racing inserts cannot both succeed.
    pub async fn create(
        &self,
        draft: &ValidatedDraft,
        password_hash: String,
    ) -> Result<Account, StoreError> {
        let now = Utc::now();
        let profile = draft.profile.clone().unwrap_or_default();
        let preferences = draft.preferences.as_ref();

        let active = accounts::ActiveModel {
            id: Set(AccountId::generate().value()),
            username: Set(draft.username.clone()),
            email: Set(draft.email.clone()),
            password_hash: Set(password_hash),
            role: Set(draft.role),
            first_name: Set(profile.first_name),
            last_name: Set(profile.last_name),
            organization: Set(profile.organization),
            phone: Set(profile.phone),
            predictions_made: Set(0),
            models_trained: Set(0),
            last_active: Set(None),
            default_model: Set(preferences.and_then(|p| p.default_model.clone())),
            notification_settings: Set(notification_settings_json(preferences)),
            api_key: Set(draft.api_key.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = active.insert(&self.conn).await.map_err(map_write_err)?;
        Ok(Account::from(model))
    }

    pub async fn get(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let model = Accounts::find_by_id(id.value()).one(&self.conn).await?;
        Ok(model.map(Account::from))
    }

    /// Exact match on the stored (already trimmed) username.
    pub async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let model = Accounts::find()
            .filter(accounts::Column::Username.eq(username))
            .one(&self.conn)
            .await?;
        Ok(model.map(Account::from))
    }

    /// Expects an already normalized email.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let model = Accounts::find()
            .filter(accounts::Column::Email.eq(email))
            .one(&self.conn)
            .await?;
        Ok(model.map(Account::from))
    }

    /// Applies a validated patch in a single `UPDATE`.
    ///
    /// Only the columns the patch carries are written, plus `updated_at`.
    /// Profile sub-fields map one to one onto columns and notification
    /// channels are merged into the stored JSON by SQLite itself, so two
    /// patches touching different sub-fields never overwrite each other.
    /// `password_hash` is written only when `new_hash` is given; usage
    /// counters are never touched here.
    pub async fn update(
        &self,
        id: AccountId,
        patch: &ValidatedPatch,
        new_hash: Option<String>,
    ) -> Result<Account, StoreError> {
        let mut update = Accounts::update_many()
            .col_expr(accounts::Column::UpdatedAt, Expr::value(Utc::now()));

        if let Some(username) = &patch.username {
            update = update.col_expr(accounts::Column::Username, Expr::value(username.clone()));
        }
        if let Some(email) = &patch.email {
            update = update.col_expr(accounts::Column::Email, Expr::value(email.clone()));
        }
        if let Some(hash) = new_hash {
            update = update.col_expr(accounts::Column::PasswordHash, Expr::value(hash));
        }
        if let Some(role) = patch.role {
            update = update.col_expr(accounts::Column::Role, Expr::value(role.as_str()));
        }
        if let Some(profile) = &patch.profile {
            let columns = [
                (accounts::Column::FirstName, &profile.first_name),
                (accounts::Column::LastName, &profile.last_name),
                (accounts::Column::Organization, &profile.organization),
                (accounts::Column::Phone, &profile.phone),
            ];
            for (column, value) in columns {
                if let Some(value) = value {
                    update = update.col_expr(column, Expr::value(value.clone()));
                }
            }
        }
        if let Some(preferences) = &patch.preferences {
            if let Some(model) = &preferences.default_model {
                update = update.col_expr(accounts::Column::DefaultModel, Expr::value(model.clone()));
            }
            if !preferences.notification_settings.is_empty() {
                update = update.col_expr(
                    accounts::Column::NotificationSettings,
                    merge_notification_settings(&preferences.notification_settings)?,
                );
            }
        }
        if let Some(api_key) = &patch.api_key {
            update = update.col_expr(accounts::Column::ApiKey, Expr::value(api_key.clone()));
        }

        let result = update
            .filter(accounts::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await
            .map_err(map_write_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }

        self.get(id).await?.ok_or(StoreError::NotFound)
    }

    /// Adds exactly one to the selected counter with `col = col + 1` and
    /// stamps `last_active`. Safe under any number of concurrent callers.
    pub async fn increment_usage(&self, id: AccountId, kind: UsageKind) -> Result<(), StoreError> {
        let column = match kind {
            UsageKind::PredictionsMade => accounts::Column::PredictionsMade,
            UsageKind::ModelsTrained => accounts::Column::ModelsTrained,
        };
        let now = Utc::now();

        let result = Accounts::update_many()
            .col_expr(column, Expr::col(column).add(1))
            .col_expr(accounts::Column::LastActive, Expr::value(Some(now)))
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now))
            .filter(accounts::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }

        debug!(account_id = %id, kind = %kind, "Usage counter incremented");
        Ok(())
    }
}
