use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CoreError;

/// Maximum username length
pub const MAX_USERNAME_LENGTH: usize = 150;

/// A registered account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Encoded password, `algorithm$iterations$salt$hash`
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    /// May use the admin console
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.username)
    }
}

/// Fields written when creating or editing a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDraft {
    pub username: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl UserDraft {
    /// A regular active account
    pub fn regular(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
        }
    }

    /// An active staff superuser
    pub fn superuser(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            is_staff: true,
            is_superuser: true,
            ..Self::regular(username, password_hash)
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_username(&self.username)?;
        if self.password_hash.is_empty() {
            return Err(CoreError::ValidationError("password: this field is required".to_string()));
        }
        Ok(())
    }
}

/// Usernames are 1-150 characters of letters, digits and `@.+-_`
pub fn validate_username(username: &str) -> Result<(), CoreError> {
    super::check_text("username", username, MAX_USERNAME_LENGTH)?;
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Err(CoreError::ValidationError(
            "username: enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
                .to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(validate_username("alice.b+c@d-e_f").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"x".repeat(151)).is_err());
    }

    #[test]
    fn superuser_draft_is_staff() {
        let draft = UserDraft::superuser("root", "hash");
        assert!(draft.is_staff && draft.is_superuser && draft.is_active);
        assert!(draft.validate().is_ok());
    }
}
