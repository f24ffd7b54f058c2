use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::rate_limiter::{current_timestamp, SlidingWindowLimiter};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleMetrics {
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub throttled_requests: u64,
    pub last_reset: u64,
}

impl Default for ThrottleMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            allowed_requests: 0,
            throttled_requests: 0,
            last_reset: current_timestamp(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountMetrics {
    pub registrations: u64,
    pub confirmations: u64,
    pub failed_confirmations: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub throttle: ThrottleMetrics,
    pub accounts: AccountMetrics,
    pub tracked_clients: usize,
    pub limiter: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    throttle: Arc<RwLock<ThrottleMetrics>>,
    accounts: Arc<RwLock<AccountMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_request(&self, allowed: bool) {
        let mut metrics = self.throttle.write().await;
        metrics.total_requests += 1;
        if allowed {
            metrics.allowed_requests += 1;
        } else {
            metrics.throttled_requests += 1;
        }
    }

    pub async fn record_registration(&self) {
        self.accounts.write().await.registrations += 1;
    }

    pub async fn record_confirmation(&self, succeeded: bool) {
        let mut metrics = self.accounts.write().await;
        if succeeded {
            metrics.confirmations += 1;
        } else {
            metrics.failed_confirmations += 1;
        }
    }

    pub async fn snapshot(&self, limiter: &SlidingWindowLimiter) -> MetricsSnapshot {
        MetricsSnapshot {
            throttle: self.throttle.read().await.clone(),
            accounts: self.accounts.read().await.clone(),
            tracked_clients: limiter.tracked_clients(),
            limiter: limiter.get_stats(),
        }
    }

    pub async fn reset(&self) {
        *self.throttle.write().await = ThrottleMetrics::default();
        *self.accounts.write().await = AccountMetrics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_requests() {
        let metrics = MetricsCollector::new();
        metrics.record_request(true).await;
        metrics.record_request(true).await;
        metrics.record_request(false).await;

        let limiter = SlidingWindowLimiter::new(60, 5);
        limiter.check_at("a", 0);
        limiter.check_at("b", 0);

        let snapshot = metrics.snapshot(&limiter).await;
        assert_eq!(snapshot.throttle.total_requests, 3);
        assert_eq!(snapshot.throttle.allowed_requests, 2);
        assert_eq!(snapshot.throttle.throttled_requests, 1);
        assert_eq!(snapshot.tracked_clients, 2);
        assert_eq!(snapshot.limiter["max_requests"], 5);
    }

    #[tokio::test]
    async fn test_account_counters_and_reset() {
        let metrics = MetricsCollector::new();
        metrics.record_registration().await;
        metrics.record_confirmation(true).await;
        metrics.record_confirmation(false).await;

        let limiter = SlidingWindowLimiter::default();
        let snapshot = metrics.snapshot(&limiter).await;
        assert_eq!(snapshot.accounts.registrations, 1);
        assert_eq!(snapshot.accounts.confirmations, 1);
        assert_eq!(snapshot.accounts.failed_confirmations, 1);

        metrics.reset().await;
        assert_eq!(metrics.snapshot(&limiter).await.accounts.registrations, 0);
    }
}
