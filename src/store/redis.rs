use ::redis::aio::MultiplexedConnection;
use ::redis::{Client, Script};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::{email_key, normalize_email, AccountStore, ConfirmationRecord, NewUser, User};
use crate::error::{StoreError, StoreResult};

const KEY_PREFIX: &str = "shopgate:";

// KEYS: email index, code index, id counter
// ARGV: key prefix, email, username, password hash, timestamp, code
const CREATE_USER_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then return -1 end
if redis.call('EXISTS', KEYS[2]) == 1 then return -2 end
local id = redis.call('INCR', KEYS[3])
redis.call('HSET', ARGV[1] .. 'user:' .. id,
  'id', id, 'email', ARGV[2], 'username', ARGV[3], 'password_hash', ARGV[4],
  'is_active', '0', 'is_staff', '0', 'date_joined', ARGV[5])
redis.call('SET', KEYS[1], id)
redis.call('SET', KEYS[2], id)
redis.call('HSET', ARGV[1] .. 'confirmation:' .. id,
  'user_id', id, 'code', ARGV[6], 'created_at', ARGV[5], 'is_used', '0')
return id
"#;

// KEYS: confirmation record, user record
// ARGV: submitted code
const CONSUME_CODE_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'code') ~= ARGV[1] then return 0 end
if redis.call('HGET', KEYS[1], 'is_used') ~= '0' then return 0 end
if redis.call('EXISTS', KEYS[2]) == 0 then return -1 end
redis.call('HSET', KEYS[1], 'is_used', '1')
redis.call('HSET', KEYS[2], 'is_active', '1')
return 1
"#;

/// Redis-backed account store. Both two-record writes run as Lua scripts so
/// they are atomic on the server.
pub struct RedisStore {
    connection: MultiplexedConnection,
    create_user: Script,
    consume_code: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Redis(format!("Failed to create Redis client: {}", e)))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Redis(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            connection,
            create_user: Script::new(CREATE_USER_SCRIPT),
            consume_code: Script::new(CONSUME_CODE_SCRIPT),
        })
    }

    async fn load_user(&self, id: u64) -> StoreResult<Option<User>> {
        let mut conn = self.connection.clone();
        let fields: HashMap<String, String> = ::redis::cmd("HGETALL")
            .arg(user_key(id))
            .query_async(&mut conn)
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }
        parse_user(&fields).map(Some)
    }
}

#[async_trait]
impl AccountStore for RedisStore {
    async fn create_user_with_code(&self, user: &NewUser, code: &str) -> StoreResult<User> {
        let mut conn = self.connection.clone();
        let email = normalize_email(&user.email);
        let now = Utc::now();

        let result: i64 = self
            .create_user
            .key(email_index_key(&user.email))
            .key(code_index_key(code))
            .key(format!("{}user:next_id", KEY_PREFIX))
            .arg(KEY_PREFIX)
            .arg(&email)
            .arg(&user.username)
            .arg(&user.password_hash)
            .arg(now.to_rfc3339())
            .arg(code)
            .invoke_async(&mut conn)
            .await?;

        match result {
            -1 => Err(StoreError::DuplicateEmail),
            -2 => Err(StoreError::DuplicateCode),
            id if id > 0 => Ok(User {
                id: id as u64,
                email,
                username: user.username.clone(),
                password_hash: user.password_hash.clone(),
                is_active: false,
                is_staff: false,
                date_joined: now,
            }),
            other => Err(StoreError::Corrupt(format!(
                "unexpected create result {}",
                other
            ))),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let mut conn = self.connection.clone();
        let id: Option<u64> = ::redis::cmd("GET")
            .arg(email_index_key(email))
            .query_async(&mut conn)
            .await?;

        match id {
            Some(id) => self.load_user(id).await,
            None => Ok(None),
        }
    }

    async fn find_confirmation(&self, user_id: u64) -> StoreResult<Option<ConfirmationRecord>> {
        let mut conn = self.connection.clone();
        let fields: HashMap<String, String> = ::redis::cmd("HGETALL")
            .arg(confirmation_key(user_id))
            .query_async(&mut conn)
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }
        parse_confirmation(&fields).map(Some)
    }

    async fn consume_code(&self, user_id: u64, code: &str) -> StoreResult<Option<User>> {
        let mut conn = self.connection.clone();
        let result: i64 = self
            .consume_code
            .key(confirmation_key(user_id))
            .key(user_key(user_id))
            .arg(code)
            .invoke_async(&mut conn)
            .await?;

        match result {
            1 => self.load_user(user_id).await,
            0 => Ok(None),
            _ => Err(StoreError::Corrupt(format!(
                "confirmation without user {}",
                user_id
            ))),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

fn user_key(id: u64) -> String {
    format!("{}user:{}", KEY_PREFIX, id)
}

fn confirmation_key(user_id: u64) -> String {
    format!("{}confirmation:{}", KEY_PREFIX, user_id)
}

fn email_index_key(email: &str) -> String {
    format!("{}user:email:{}", KEY_PREFIX, email_key(email))
}

fn code_index_key(code: &str) -> String {
    format!("{}code:{}", KEY_PREFIX, code)
}

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> StoreResult<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| StoreError::Corrupt(format!("missing field '{}'", name)))
}

fn parse_id(value: &str) -> StoreResult<u64> {
    value
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("invalid id '{}'", value)))
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("invalid timestamp '{}': {}", value, e)))
}

fn parse_user(fields: &HashMap<String, String>) -> StoreResult<User> {
    Ok(User {
        id: parse_id(field(fields, "id")?)?,
        email: field(fields, "email")?.to_string(),
        username: field(fields, "username")?.to_string(),
        password_hash: field(fields, "password_hash")?.to_string(),
        is_active: field(fields, "is_active")? == "1",
        is_staff: field(fields, "is_staff")? == "1",
        date_joined: parse_timestamp(field(fields, "date_joined")?)?,
    })
}

fn parse_confirmation(fields: &HashMap<String, String>) -> StoreResult<ConfirmationRecord> {
    Ok(ConfirmationRecord {
        user_id: parse_id(field(fields, "user_id")?)?,
        code: field(fields, "code")?.to_string(),
        created_at: parse_timestamp(field(fields, "created_at")?)?,
        is_used: field(fields, "is_used")? == "1",
    })
}
