//! Account persistence.
//!
//! Users and their confirmation codes are always written together, so the
//! store exposes units of work rather than per-table CRUD.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreResult;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: u64,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

/// A user about to be registered. Always stored inactive.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationRecord {
    pub user_id: u64,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub is_used: bool,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Create an inactive user together with its unused confirmation code.
    /// Nothing is written when either the email or the code is taken.
    async fn create_user_with_code(&self, user: &NewUser, code: &str) -> StoreResult<User>;

    /// Case-insensitive email lookup
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_confirmation(&self, user_id: u64) -> StoreResult<Option<ConfirmationRecord>>;

    /// Mark the user's unused code as used and activate the user, both or neither.
    /// Returns `None` when no unused record with exactly `code` exists.
    async fn consume_code(&self, user_id: u64, code: &str) -> StoreResult<Option<User>>;

    async fn ping(&self) -> StoreResult<()>;

    fn backend(&self) -> &'static str;
}

/// Lower-cases the domain part, as account emails are stored.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Key used for case-insensitive email uniqueness and lookup
pub fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "Alice@example.com");
        assert_eq!(normalize_email("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn test_email_key_is_case_insensitive() {
        assert_eq!(email_key("A@X.com"), email_key("a@x.COM"));
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User {
            id: 1,
            email: "a@x.com".to_string(),
            username: String::new(),
            password_hash: "secret".to_string(),
            is_active: false,
            is_staff: false,
            date_joined: Utc::now(),
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
    }
}
