use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::accounts::AccountService;
use crate::config::Config;
use crate::confirmation::ConfirmationService;
use crate::error::{Result, ServiceError};
use crate::health::HealthChecker;
use crate::key_generator::ClientKeyExtractor;
use crate::metrics::MetricsCollector;
use crate::rate_limiter::SlidingWindowLimiter;
use crate::response::MessageResponse;
use crate::store::AccountStore;

/// Application state shared by handlers and middleware
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub limiter: Arc<SlidingWindowLimiter>,
    pub client_keys: Arc<ClientKeyExtractor>,
    pub accounts: Arc<AccountService>,
    pub health: Arc<HealthChecker>,
    pub metrics: MetricsCollector,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn AccountStore>) -> Self {
        let confirmations = ConfirmationService::new(store.clone());
        Self::with_confirmations(config, store, confirmations)
    }

    pub fn with_confirmations(
        config: Config,
        store: Arc<dyn AccountStore>,
        confirmations: ConfirmationService,
    ) -> Self {
        let limiter = Arc::new(SlidingWindowLimiter::new(
            config.rate_limit_window_secs,
            config.rate_limit_max_requests,
        ));
        let client_keys = Arc::new(ClientKeyExtractor::new(
            config.trust_forwarded_for,
            config.trusted_proxies.clone(),
        ));

        Self {
            accounts: Arc::new(AccountService::new(store.clone(), confirmations)),
            health: Arc::new(HealthChecker::new(store, limiter.clone())),
            config: Arc::new(config),
            limiter,
            client_keys,
            metrics: MetricsCollector::new(),
        }
    }
}

// Missing fields deserialize as empty strings and are reported by the
// account service as validation errors.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Register an inactive account and issue its confirmation code
pub async fn register(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(payload) = payload?;
    state
        .accounts
        .register(&payload.email, &payload.username, &payload.password)
        .await?;
    state.metrics.record_registration().await;

    Ok((StatusCode::CREATED, Json(MessageResponse::registered())))
}

/// Consume a confirmation code and activate the account
pub async fn confirm(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ConfirmRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(payload) = payload?;
    match state.accounts.confirm(&payload.email, &payload.code).await {
        Ok(_) => {
            state.metrics.record_confirmation(true).await;
            Ok(Json(MessageResponse::confirmed()))
        }
        Err(e) => {
            if matches!(e, ServiceError::UserNotFound | ServiceError::InvalidOrUsedCode) {
                state.metrics.record_confirmation(false).await;
            }
            Err(e)
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(payload) = payload?;
    state.accounts.login(&payload.email, &payload.password).await?;
    Ok(Json(MessageResponse::logged_in()))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.health.check_health().await)
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot(&state.limiter).await)
}

pub async fn reset_metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.reset().await;
    tracing::info!("Metrics counters reset");
    StatusCode::NO_CONTENT
}

/// Forget the recorded requests of one client
pub async fn reset_rate_limit(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<impl IntoResponse> {
    if !state.limiter.reset(&client_id) {
        return Err(ServiceError::NotFound);
    }
    tracing::info!(client_id = %client_id, "Rate limit window reset");
    Ok(Json(MessageResponse::new("Rate limit window reset")))
}

pub async fn not_found() -> ServiceError {
    ServiceError::NotFound
}
