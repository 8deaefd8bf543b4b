use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::{AccountId, Role};
use crate::entities::accounts;

/// Plaintext password as supplied by a caller.
///
/// Deliberately not `Serialize`, and its `Debug` output is redacted so it can
/// sit inside drafts and patches that get logged.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    #[must_use]
    pub fn new(plaintext: impl Into<String>) -> Self {
        Self(plaintext.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Profile {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.organization.is_none()
            && self.phone.is_none()
    }

    /// Keeps only the sub-fields that are present and differ from `current`.
    #[must_use]
    pub fn changes_from(self, current: &Self) -> Self {
        fn changed(new: Option<String>, current: Option<&String>) -> Option<String> {
            new.filter(|value| current != Some(value))
        }

        Self {
            first_name: changed(self.first_name, current.first_name.as_ref()),
            last_name: changed(self.last_name, current.last_name.as_ref()),
            organization: changed(self.organization, current.organization.as_ref()),
            phone: changed(self.phone, current.phone.as_ref()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub notification_settings: BTreeMap<String, bool>,
}

impl Preferences {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.default_model.is_none() && self.notification_settings.is_empty()
    }

    /// Keeps `default_model` and the notification channels that differ from
    /// `current`.
    #[must_use]
    pub fn changes_from(self, current: &Self) -> Self {
        Self {
            default_model: self
                .default_model
                .filter(|model| current.default_model.as_ref() != Some(model)),
            notification_settings: self
                .notification_settings
                .into_iter()
                .filter(|(channel, enabled)| {
                    current.notification_settings.get(channel) != Some(enabled)
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub predictions_made: u64,
    pub models_trained: u64,
    pub last_active: Option<DateTime<Utc>>,
}

/// A persisted account.
///
/// `password_hash` and `api_key` are skipped by `Serialize` and redacted by
/// `Debug`; neither ever leaves the core through a response or a log line.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub profile: Option<Profile>,
    pub usage_stats: UsageStats,
    pub preferences: Option<Preferences>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("role", &self.role)
            .field("profile", &self.profile)
            .field("usage_stats", &self.usage_stats)
            .field("preferences", &self.preferences)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl From<accounts::Model> for Account {
    fn from(model: accounts::Model) -> Self {
        let profile = Profile {
            first_name: model.first_name,
            last_name: model.last_name,
            organization: model.organization,
            phone: model.phone,
        };

        let notification_settings = model
            .notification_settings
            .and_then(|value| serde_json::from_value::<BTreeMap<String, bool>>(value).ok());

        let preferences = if model.default_model.is_none() && notification_settings.is_none() {
            None
        } else {
            Some(Preferences {
                default_model: model.default_model,
                notification_settings: notification_settings.unwrap_or_default(),
            })
        };

        Self {
            id: AccountId::from_uuid(model.id),
            username: model.username,
            email: model.email,
            password_hash: model.password_hash,
            role: model.role,
            profile: (!profile.is_empty()).then_some(profile),
            usage_stats: UsageStats {
                predictions_made: u64::try_from(model.predictions_made).unwrap_or(0),
                models_trained: u64::try_from(model.models_trained).unwrap_or(0),
                last_active: model.last_active,
            },
            preferences,
            api_key: model.api_key,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// A top-level request field as received.
///
/// A value of the wrong JSON type becomes `WrongType` instead of failing the
/// whole payload, so it can be reported next to every other violation. The
/// rejected value itself is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    Value(T),
    WrongType,
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Field<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(serde_json::from_value(raw).map_or(Self::WrongType, Self::Value))
    }
}

/// Caller-supplied, unvalidated account fields.
///
/// Nested records arrive as raw JSON so that a wrongly shaped value can be
/// reported per field instead of failing the whole payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountDraft {
    #[serde(default)]
    pub username: Option<Field<String>>,
    #[serde(default)]
    pub email: Option<Field<String>>,
    #[serde(default)]
    pub password: Option<Field<Password>>,
    #[serde(default)]
    pub role: Option<Field<String>>,
    #[serde(default)]
    pub profile: Option<serde_json::Value>,
    #[serde(default)]
    pub preferences: Option<serde_json::Value>,
    #[serde(default)]
    pub api_key: Option<Field<String>>,
}

impl AccountDraft {
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: Some(Field::Value(username.into())),
            email: Some(Field::Value(email.into())),
            password: Some(Field::Value(Password::new(password))),
            ..Self::default()
        }
    }
}

/// Caller-supplied changes to an existing account. `None` means "leave as is".
///
/// `password: Some(_)` is the only thing that causes a rehash, even when the
/// new plaintext equals the old one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountPatch {
    #[serde(default)]
    pub username: Option<Field<String>>,
    #[serde(default)]
    pub email: Option<Field<String>>,
    #[serde(default)]
    pub password: Option<Field<Password>>,
    #[serde(default)]
    pub role: Option<Field<String>>,
    #[serde(default)]
    pub profile: Option<serde_json::Value>,
    #[serde(default)]
    pub preferences: Option<serde_json::Value>,
    #[serde(default)]
    pub api_key: Option<Field<String>>,
}

/// Draft that passed validation, with normalization and defaults applied.
#[derive(Debug, Clone)]
pub struct ValidatedDraft {
    pub username: String,
    pub email: String,
    pub password: Password,
    pub role: Role,
    pub profile: Option<Profile>,
    pub preferences: Option<Preferences>,
    pub api_key: Option<String>,
}

/// Patch that passed validation, reduced to the values that actually change.
///
/// `profile` and `preferences` carry only the changed sub-fields; the store
/// overlays them onto whatever is persisted at write time.
#[derive(Debug, Clone, Default)]
pub struct ValidatedPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<Password>,
    pub role: Option<Role>,
    pub profile: Option<Profile>,
    pub preferences: Option<Preferences>,
    pub api_key: Option<String>,
}
