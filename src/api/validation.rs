use super::ApiError;
use crate::domain::AccountId;

pub fn validate_account_id(raw: &str) -> Result<AccountId, ApiError> {
    raw.parse::<AccountId>().map_err(|_| {
        ApiError::validation(format!(
            "Invalid account ID: {raw}. ID must be a UUID"
        ))
    })
}
