//! One-time confirmation codes.
//!
//! A code is issued together with the inactive account it belongs to and can be
//! consumed exactly once, which activates the account. Codes do not expire.

use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, ServiceError, StoreError};
use crate::store::{AccountStore, NewUser, User};

pub const CODE_LENGTH: usize = 6;
pub const MAX_ISSUE_ATTEMPTS: usize = 10;
const MAX_CODE: u32 = 999_999;

/// Produces candidate confirmation codes
pub type CodeSource = Box<dyn Fn() -> String + Send + Sync>;

/// Uniform 6-digit code, zero-padded
pub fn generate_code<R: Rng>(rng: &mut R) -> String {
    format!("{:06}", rng.gen_range(0..=MAX_CODE))
}

pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone)]
pub struct Issued {
    pub user: User,
    pub code: String,
}

pub struct ConfirmationService {
    store: Arc<dyn AccountStore>,
    code_source: CodeSource,
}

impl ConfirmationService {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self::with_code_source(store, Box::new(|| generate_code(&mut rand::thread_rng())))
    }

    pub fn with_code_source(store: Arc<dyn AccountStore>, code_source: CodeSource) -> Self {
        Self { store, code_source }
    }

    /// Create the inactive account and its unused code in one unit of work.
    /// Colliding codes are regenerated, up to `MAX_ISSUE_ATTEMPTS` times.
    pub async fn issue(&self, user: NewUser) -> Result<Issued> {
        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let code = (self.code_source)();

            match self.store.create_user_with_code(&user, &code).await {
                Ok(created) => {
                    info!(user_id = created.id, attempt, "Confirmation code issued");
                    return Ok(Issued {
                        user: created,
                        code,
                    });
                }
                Err(StoreError::DuplicateCode) => {
                    debug!(attempt, "Confirmation code collision, regenerating");
                }
                Err(StoreError::DuplicateEmail) => return Err(ServiceError::EmailTaken),
                Err(e) => return Err(e.into()),
            }
        }

        warn!(attempts = MAX_ISSUE_ATTEMPTS, "Could not find a free confirmation code");
        Err(ServiceError::Internal(format!(
            "no unique confirmation code after {} attempts",
            MAX_ISSUE_ATTEMPTS
        )))
    }

    /// Consume `code` for the account registered under `email` and activate it.
    pub async fn validate(&self, email: &str, code: &str) -> Result<User> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        // Only six-digit codes can match, so skip the store round trip.
        if !is_well_formed(code) {
            debug!(user_id = user.id, "Rejected malformed confirmation code");
            return Err(ServiceError::InvalidOrUsedCode);
        }

        match self.store.consume_code(user.id, code).await? {
            Some(activated) => {
                info!(user_id = activated.id, "Account confirmed");
                Ok(activated)
            }
            None => {
                debug!(user_id = user.id, "Rejected confirmation code");
                Err(ServiceError::InvalidOrUsedCode)
            }
        }
    }
}
