use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{email_key, normalize_email, AccountStore, ConfirmationRecord, NewUser, User};
use crate::error::{StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    next_id: u64,
    users: HashMap<u64, User>,
    emails: HashMap<String, u64>,
    codes: HashMap<String, u64>,
    confirmations: HashMap<u64, ConfirmationRecord>,
}

/// Process-local account store. Every operation runs under one lock, which
/// makes each two-record write a single unit of work.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("Failed to acquire account store lock".to_string()))
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_user_with_code(&self, user: &NewUser, code: &str) -> StoreResult<User> {
        let mut tables = self.lock()?;

        let key = email_key(&user.email);
        if tables.emails.contains_key(&key) {
            return Err(StoreError::DuplicateEmail);
        }
        if tables.codes.contains_key(code) {
            return Err(StoreError::DuplicateCode);
        }

        tables.next_id += 1;
        let id = tables.next_id;
        let now = Utc::now();

        let created = User {
            id,
            email: normalize_email(&user.email),
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            is_active: false,
            is_staff: false,
            date_joined: now,
        };

        tables.users.insert(id, created.clone());
        tables.emails.insert(key, id);
        tables.codes.insert(code.to_string(), id);
        tables.confirmations.insert(
            id,
            ConfirmationRecord {
                user_id: id,
                code: code.to_string(),
                created_at: now,
                is_used: false,
            },
        );

        Ok(created)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.lock()?;
        Ok(tables
            .emails
            .get(&email_key(email))
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn find_confirmation(&self, user_id: u64) -> StoreResult<Option<ConfirmationRecord>> {
        let tables = self.lock()?;
        Ok(tables.confirmations.get(&user_id).cloned())
    }

    async fn consume_code(&self, user_id: u64, code: &str) -> StoreResult<Option<User>> {
        let mut tables = self.lock()?;
        let tables = &mut *tables;

        let record = match tables.confirmations.get_mut(&user_id) {
            Some(record) if !record.is_used && record.code == code => record,
            _ => return Ok(None),
        };
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::Corrupt(format!("confirmation without user {}", user_id)))?;

        record.is_used = true;
        user.is_active = true;
        Ok(Some(user.clone()))
    }

    async fn ping(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
