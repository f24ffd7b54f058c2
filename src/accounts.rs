//! Registration, confirmation and login.

use std::sync::Arc;
use tracing::{debug, info};

use crate::confirmation::{ConfirmationService, Issued};
use crate::error::{Result, ServiceError};
use crate::password::{hash_password, verify_password};
use crate::store::{AccountStore, NewUser, User};

pub struct AccountService {
    store: Arc<dyn AccountStore>,
    confirmations: ConfirmationService,
}

impl AccountService {
    pub fn new(store: Arc<dyn AccountStore>, confirmations: ConfirmationService) -> Self {
        Self {
            store,
            confirmations,
        }
    }

    pub async fn register(&self, email: &str, username: &str, password: &str) -> Result<Issued> {
        let email = required("email", email)?;
        if password.is_empty() {
            return Err(ServiceError::Validation("password is required".to_string()));
        }

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))??;

        let user = NewUser {
            email: email.to_string(),
            username: username.trim().to_string(),
            password_hash,
        };
        let issued = self.confirmations.issue(user).await?;

        // Delivery of the code happens out of band.
        debug!(
            target: "shopgate::delivery",
            user_id = issued.user.id,
            email = %issued.user.email,
            code = %issued.code,
            "Confirmation code ready for delivery"
        );
        Ok(issued)
    }

    pub async fn confirm(&self, email: &str, code: &str) -> Result<User> {
        let email = required("email", email)?;
        // The code is compared verbatim, so it is not trimmed.
        if code.is_empty() {
            return Err(ServiceError::Validation("code is required".to_string()));
        }
        self.confirmations.validate(email, code).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let email = required("email", email)?;

        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        let hash = user.password_hash.clone();
        let password = password.to_string();
        let valid = tokio::task::spawn_blocking(move || verify_password(&hash, &password))
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))??;

        if !valid {
            return Err(ServiceError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(ServiceError::AccountInactive);
        }

        info!(user_id = user.id, "User logged in");
        Ok(user)
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::Validation(format!("{} is required", field)));
    }
    Ok(value)
}
