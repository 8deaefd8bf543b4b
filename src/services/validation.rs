//! Validation layer for account drafts and patches.
//!
//! Every check runs and every violation is collected; nothing short-circuits
//! on the first failure. Normalization (trimmed username, lowercased email)
//! happens before any other check looks at a value.

use regex::Regex;
use serde::Serialize;
use serde::ser::SerializeStruct;
use std::sync::OnceLock;
use thiserror::Error;

use crate::domain::Role;
use crate::models::account::{
    Account, AccountDraft, AccountPatch, Field, Password, Preferences, Profile, ValidatedDraft,
    ValidatedPatch,
};

const ROLE_CHOICES: &str = "standard, admin, analyst";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("{field} has an unexpected shape")]
    TypeMismatch { field: &'static str },

    #[error("{field} must be one of: {allowed}")]
    InvalidEnum {
        field: &'static str,
        allowed: &'static str,
    },

    #[error("{field} is not well-formed")]
    InvalidFormat { field: &'static str },
}

impl ValidationError {
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::MissingField { field }
            | Self::TypeMismatch { field }
            | Self::InvalidEnum { field, .. }
            | Self::InvalidFormat { field } => field,
        }
    }

    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::InvalidEnum { .. } => "invalid_enum",
            Self::InvalidFormat { .. } => "invalid_format",
        }
    }
}

impl Serialize for ValidationError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("ValidationError", 3)?;
        state.serialize_field("field", self.field())?;
        state.serialize_field("reason", self.reason())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Trims surrounding whitespace. Case is preserved.
#[must_use]
pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_string()
}

/// Trims and folds ASCII letters to lowercase.
#[must_use]
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s.]+(\.[^@\s.]+)+$").expect("Invalid regex"))
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    default_role: Role,
}

impl Validator {
    #[must_use]
    pub const fn new(default_role: Role) -> Self {
        Self { default_role }
    }

    /// Validates a creation draft.
    ///
    /// # Errors
    ///
    /// Returns every violation found, in field order.
    pub fn validate_new(&self, draft: AccountDraft) -> Result<ValidatedDraft, Vec<ValidationError>> {
        let mut errors = Vec::new();

        let username = typed("username", draft.username, &mut errors)
            .and_then(|raw| required_username(raw.as_deref(), &mut errors));
        let email = typed("email", draft.email, &mut errors)
            .and_then(|raw| required_email(raw.as_deref(), &mut errors));
        let password = typed("password", draft.password, &mut errors)
            .and_then(|raw| required_password(raw, &mut errors));

        let role = match typed("role", draft.role, &mut errors) {
            None => None,
            Some(None) => Some(self.default_role),
            Some(Some(raw)) => parse_role(&raw, &mut errors),
        };

        let profile = parse_nested::<Profile>("profile", draft.profile, &mut errors);
        let preferences = parse_nested::<Preferences>("preferences", draft.preferences, &mut errors);
        let api_key = typed("api_key", draft.api_key, &mut errors).flatten();

        match (username, email, password, role) {
            (Some(username), Some(email), Some(password), Some(role)) if errors.is_empty() => {
                Ok(ValidatedDraft {
                    username,
                    email,
                    password,
                    role,
                    profile: profile.filter(|p| !p.is_empty()),
                    preferences: preferences.filter(|p| !p.is_empty()),
                    api_key,
                })
            }
            _ => Err(errors),
        }
    }

    /// Validates a patch against the account it will be applied to.
    ///
    /// Values equal to what `existing` already holds are dropped, so the
    /// result carries only effective changes. A present password always
    /// counts as a change.
    ///
    /// # Errors
    ///
    /// Returns every violation found, in field order.
    pub fn validate_patch(
        &self,
        existing: &Account,
        patch: AccountPatch,
    ) -> Result<ValidatedPatch, Vec<ValidationError>> {
        let mut errors = Vec::new();

        let username = typed("username", patch.username, &mut errors)
            .flatten()
            .and_then(|raw| required_username(Some(raw.as_str()), &mut errors))
            .filter(|username| *username != existing.username);
        let email = typed("email", patch.email, &mut errors)
            .flatten()
            .and_then(|raw| required_email(Some(raw.as_str()), &mut errors))
            .filter(|email| *email != existing.email);
        let password = typed("password", patch.password, &mut errors)
            .flatten()
            .and_then(|raw| required_password(Some(raw), &mut errors));
        let role = typed("role", patch.role, &mut errors)
            .flatten()
            .and_then(|raw| parse_role(&raw, &mut errors))
            .filter(|role| *role != existing.role);

        let profile = parse_nested::<Profile>("profile", patch.profile, &mut errors)
            .map(|p| p.changes_from(&existing.profile.clone().unwrap_or_default()))
            .filter(|p| !p.is_empty());
        let preferences = parse_nested::<Preferences>("preferences", patch.preferences, &mut errors)
            .map(|p| p.changes_from(&existing.preferences.clone().unwrap_or_default()))
            .filter(|p| !p.is_empty());
        let api_key = typed("api_key", patch.api_key, &mut errors).flatten();

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ValidatedPatch {
            username,
            email,
            password,
            role,
            profile,
            preferences,
            api_key,
        })
    }
}

/// `None` when the field had the wrong JSON type (already reported),
/// otherwise whether it was present.
fn typed<T>(
    field: &'static str,
    raw: Option<Field<T>>,
    errors: &mut Vec<ValidationError>,
) -> Option<Option<T>> {
    match raw {
        None => Some(None),
        Some(Field::Value(value)) => Some(Some(value)),
        Some(Field::WrongType) => {
            errors.push(ValidationError::TypeMismatch { field });
            None
        }
    }
}

fn required_username(raw: Option<&str>, errors: &mut Vec<ValidationError>) -> Option<String> {
    let username = raw.map(normalize_username).filter(|u| !u.is_empty());
    if username.is_none() {
        errors.push(ValidationError::MissingField { field: "username" });
    }
    username
}

fn required_email(raw: Option<&str>, errors: &mut Vec<ValidationError>) -> Option<String> {
    let Some(email) = raw.map(normalize_email).filter(|e| !e.is_empty()) else {
        errors.push(ValidationError::MissingField { field: "email" });
        return None;
    };

    if !email_regex().is_match(&email) {
        errors.push(ValidationError::InvalidFormat { field: "email" });
        return None;
    }

    Some(email)
}

/// Blank-after-trim counts as missing, but the secret itself is never trimmed.
fn required_password(
    raw: Option<Password>,
    errors: &mut Vec<ValidationError>,
) -> Option<Password> {
    let password = raw.filter(|p| !p.is_blank());
    if password.is_none() {
        errors.push(ValidationError::MissingField { field: "password" });
    }
    password
}

fn parse_role(raw: &str, errors: &mut Vec<ValidationError>) -> Option<Role> {
    let role = Role::parse(raw);
    if role.is_none() {
        errors.push(ValidationError::InvalidEnum {
            field: "role",
            allowed: ROLE_CHOICES,
        });
    }
    role
}

fn parse_nested<T: serde::de::DeserializeOwned>(
    field: &'static str,
    raw: Option<serde_json::Value>,
    errors: &mut Vec<ValidationError>,
) -> Option<T> {
    let value = raw?;
    if value.is_null() {
        return None;
    }

    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            errors.push(ValidationError::TypeMismatch { field });
            None
        }
    }
}
