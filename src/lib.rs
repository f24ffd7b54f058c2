pub mod accounts;
pub mod config;
pub mod config_validator;
pub mod confirmation;
pub mod error;
pub mod handlers;
pub mod health;
pub mod key_generator;
pub mod metrics;
pub mod middleware;
pub mod password;
pub mod rate_limiter;
pub mod response;
pub mod server;
pub mod store;

pub use config::Config;
pub use error::{Result, ServiceError, StoreError};
pub use handlers::AppState;
pub use rate_limiter::{Decision, SlidingWindowLimiter};
pub use server::create_app;
