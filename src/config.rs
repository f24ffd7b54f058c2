use clap::{ArgAction, Parser};
use std::net::{IpAddr, SocketAddr};

use crate::config_validator::ConfigValidator;
use crate::error::ServiceError;
use crate::rate_limiter::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_SECS};

pub const DEFAULT_MAX_BODY_BYTES: usize = 2_621_440;

#[derive(Debug, Parser, Clone)]
#[command(name = "shopgate")]
#[command(about = "Rate limiting and account confirmation service for the shop API")]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Redis connection URL; accounts are kept in memory when unset
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Sliding window length in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = DEFAULT_WINDOW_SECS)]
    pub rate_limit_window_secs: u64,

    /// Requests allowed per client inside one window
    #[arg(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value_t = DEFAULT_MAX_REQUESTS)]
    pub rate_limit_max_requests: usize,

    /// Path prefix that is rate limited and guarded
    #[arg(long, env = "API_PREFIX", default_value = "/api/")]
    pub api_prefix: String,

    /// Use the first X-Forwarded-For entry as the client identifier
    #[arg(long, env = "TRUST_FORWARDED_FOR", default_value_t = true, action = ArgAction::Set)]
    pub trust_forwarded_for: bool,

    /// Peers allowed to supply X-Forwarded-For (comma separated); empty trusts every peer
    #[arg(long, env = "TRUSTED_PROXIES", value_delimiter = ',')]
    pub trusted_proxies: Vec<IpAddr>,

    /// Largest accepted request body in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Mount the operator routes that reset metrics and client windows
    #[arg(long, env = "ADMIN_ROUTES", default_value_t = false, action = ArgAction::Set)]
    pub admin_routes: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            redis_url: None,
            rate_limit_window_secs: DEFAULT_WINDOW_SECS,
            rate_limit_max_requests: DEFAULT_MAX_REQUESTS,
            api_prefix: "/api/".to_string(),
            trust_forwarded_for: true,
            trusted_proxies: Vec::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            admin_routes: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from command line flags, falling back to environment variables
    pub fn from_env() -> Result<Self, ServiceError> {
        let config = Config::try_parse().map_err(|e| ServiceError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if let Some(url) = &self.redis_url {
            ConfigValidator::validate_redis_url(url)?;
        }
        ConfigValidator::validate_rate_limit(self.rate_limit_window_secs, self.rate_limit_max_requests)?;
        ConfigValidator::validate_api_prefix(&self.api_prefix)?;
        ConfigValidator::validate_body_limit(self.max_body_bytes)?;
        Ok(())
    }

    /// Whether a request path falls under the guarded API namespace
    pub fn is_api_path(&self, path: &str) -> bool {
        path.starts_with(&self.api_prefix)
    }
}
