use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::rate_limiter::SlidingWindowLimiter;
use crate::store::AccountStore;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub tracked_clients: usize,
    pub dependencies: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub store: ServiceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub backend: String,
    pub status: String,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

pub struct HealthChecker {
    store: Arc<dyn AccountStore>,
    limiter: Arc<SlidingWindowLimiter>,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn AccountStore>, limiter: Arc<SlidingWindowLimiter>) -> Self {
        // Pin the uptime origin to service construction.
        let _ = *START_TIME;
        Self { store, limiter }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let now = SystemTime::now();
        let uptime = now.duration_since(*START_TIME)
            .unwrap_or_default()
            .as_secs();

        let store_status = self.check_store().await;

        let overall_status = if store_status.status == "healthy" {
            "healthy"
        } else {
            "degraded" // rate limiting keeps working without the store
        };

        HealthStatus {
            status: overall_status.to_string(),
            timestamp: now.duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            tracked_clients: self.limiter.tracked_clients(),
            dependencies: DependencyStatus {
                store: store_status,
            },
        }
    }

    async fn check_store(&self) -> ServiceStatus {
        let start = Instant::now();
        let result = self.store.ping().await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => ServiceStatus {
                backend: self.store.backend().to_string(),
                status: "healthy".to_string(),
                response_time_ms,
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, backend = self.store.backend(), "Store health check failed");
                ServiceStatus {
                    backend: self.store.backend().to_string(),
                    status: "unavailable".to_string(),
                    response_time_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_health_status_serialization() {
        let status = HealthStatus {
            status: "healthy".to_string(),
            timestamp: 1234567890,
            version: "1.0.0".to_string(),
            uptime_seconds: 3600,
            tracked_clients: 4,
            dependencies: DependencyStatus {
                store: ServiceStatus {
                    backend: "memory".to_string(),
                    status: "healthy".to_string(),
                    response_time_ms: 0,
                    error: None,
                },
            },
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("1234567890"));
    }

    #[tokio::test]
    async fn test_memory_store_is_healthy() {
        let limiter = Arc::new(SlidingWindowLimiter::default());
        limiter.check_at("client", 0);
        let checker = HealthChecker::new(Arc::new(MemoryStore::new()), limiter);

        let status = checker.check_health().await;
        assert_eq!(status.status, "healthy");
        assert_eq!(status.tracked_clients, 1);
        assert_eq!(status.dependencies.store.backend, "memory");
    }
}
