//! Sliding window rate limiting.
//!
//! Every client identifier owns the ordered timestamps of its requests inside
//! the trailing window. Timestamps are unix seconds; a timestamp `t` is inside
//! the window at `now` while `t + window > now`.

use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_WINDOW_SECS: u64 = 60;
pub const DEFAULT_MAX_REQUESTS: usize = 100;

/// Outcome of a single check. Rejection is a normal outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow { remaining: usize },
    Reject { retry_after: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// Per-client sliding window counter held in process memory.
pub struct SlidingWindowLimiter {
    window_secs: u64,
    max_requests: usize,
    windows: DashMap<String, VecDeque<u64>>,
    last_sweep: AtomicU64,
}

impl SlidingWindowLimiter {
    pub fn new(window_secs: u64, max_requests: usize) -> Self {
        Self {
            window_secs,
            max_requests,
            windows: DashMap::new(),
            last_sweep: AtomicU64::new(0),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Check a request from `client_id` against the wall clock
    pub fn check(&self, client_id: &str) -> Decision {
        self.check_at(client_id, current_timestamp())
    }

    /// Check a request from `client_id` arriving at `now` (unix seconds)
    pub fn check_at(&self, client_id: &str, now: u64) -> Decision {
        self.maybe_sweep(now);

        let decision = {
            // The entry guard holds the shard write lock for the whole
            // prune + count + append sequence.
            let mut timestamps = self.windows.entry(client_id.to_string()).or_default();
            prune(&mut timestamps, now, self.window_secs);

            if timestamps.len() >= self.max_requests {
                Decision::Reject {
                    retry_after: self.window_secs,
                }
            } else {
                timestamps.push_back(now);
                Decision::Allow {
                    remaining: self.max_requests - timestamps.len(),
                }
            }
        };

        if !decision.is_allowed() {
            self.windows.remove_if(client_id, |_, timestamps| timestamps.is_empty());
        }

        decision
    }

    /// Number of requests `client_id` has inside the window at `now`
    pub fn requests_in_window(&self, client_id: &str, now: u64) -> usize {
        self.windows
            .get(client_id)
            .map(|timestamps| {
                timestamps
                    .iter()
                    .filter(|&&t| in_window(t, now, self.window_secs))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Forget all recorded requests of a client
    pub fn reset(&self, client_id: &str) -> bool {
        self.windows.remove(client_id).is_some()
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Drop expired timestamps of every client and remove empty entries.
    /// Returns the number of removed clients.
    pub fn sweep(&self, now: u64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| {
            prune(timestamps, now, self.window_secs);
            !timestamps.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    pub fn get_stats(&self) -> HashMap<String, u64> {
        let mut stats = HashMap::new();
        stats.insert("tracked_clients".to_string(), self.windows.len() as u64);
        stats.insert("window_secs".to_string(), self.window_secs);
        stats.insert("max_requests".to_string(), self.max_requests as u64);
        stats
    }

    // Sweeps at most once per window; only the caller winning the exchange sweeps.
    fn maybe_sweep(&self, now: u64) {
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now < last.saturating_add(self.window_secs) {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            let removed = self.sweep(now);
            if removed > 0 {
                tracing::debug!(removed, remaining = self.windows.len(), "Swept idle rate limit entries");
            }
        }
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECS, DEFAULT_MAX_REQUESTS)
    }
}

fn in_window(timestamp: u64, now: u64, window_secs: u64) -> bool {
    timestamp.saturating_add(window_secs) > now
}

fn prune(timestamps: &mut VecDeque<u64>, now: u64, window_secs: u64) {
    while let Some(&oldest) = timestamps.front() {
        if in_window(oldest, now, window_secs) {
            break;
        }
        timestamps.pop_front();
    }
}

pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_hundred_requests_then_reject() {
        let limiter = SlidingWindowLimiter::default();

        for i in 0..100 {
            let decision = limiter.check_at("1.2.3.4", 0);
            assert_eq!(decision, Decision::Allow { remaining: 99 - i });
        }

        assert_eq!(
            limiter.check_at("1.2.3.4", 0),
            Decision::Reject { retry_after: 60 }
        );
        assert!(limiter.check_at("1.2.3.4", 61).is_allowed());
    }

    #[test]
    fn test_rejected_request_is_not_recorded() {
        let limiter = SlidingWindowLimiter::new(60, 2);
        limiter.check_at("client", 10);
        limiter.check_at("client", 20);

        for _ in 0..5 {
            assert!(!limiter.check_at("client", 30).is_allowed());
        }
        assert_eq!(limiter.requests_in_window("client", 30), 2);

        // The request at t=10 leaves the window at t=70, freeing one slot.
        assert!(limiter.check_at("client", 70).is_allowed());
        assert!(!limiter.check_at("client", 70).is_allowed());
    }

    #[test]
    fn test_window_slides() {
        let limiter = SlidingWindowLimiter::new(60, 3);
        limiter.check_at("client", 0);
        limiter.check_at("client", 30);
        limiter.check_at("client", 59);
        assert!(!limiter.check_at("client", 59).is_allowed());

        assert!(limiter.check_at("client", 60).is_allowed());
        assert!(!limiter.check_at("client", 60).is_allowed());
    }

    #[test]
    fn test_clients_are_isolated() {
        let limiter = SlidingWindowLimiter::new(60, 5);
        for _ in 0..5 {
            limiter.check_at("client-a", 100);
        }

        assert!(!limiter.check_at("client-a", 100).is_allowed());
        assert_eq!(
            limiter.check_at("client-b", 100),
            Decision::Allow { remaining: 4 }
        );
    }

    #[test]
    fn test_sweep_removes_idle_clients() {
        let limiter = SlidingWindowLimiter::new(60, 10);
        limiter.check_at("idle", 1000);
        limiter.check_at("active", 1000);
        assert_eq!(limiter.tracked_clients(), 2);

        // A later check triggers the opportunistic sweep.
        limiter.check_at("active", 1100);
        assert_eq!(limiter.tracked_clients(), 1);
        assert_eq!(limiter.requests_in_window("idle", 1100), 0);
    }

    #[test]
    fn test_explicit_sweep() {
        let limiter = SlidingWindowLimiter::new(60, 10);
        limiter.check_at("a", 0);
        limiter.check_at("b", 50);

        assert_eq!(limiter.sweep(70), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_reset() {
        let limiter = SlidingWindowLimiter::new(60, 1);
        limiter.check_at("client", 0);
        assert!(!limiter.check_at("client", 1).is_allowed());

        assert!(limiter.reset("client"));
        assert!(limiter.check_at("client", 1).is_allowed());
        assert!(!limiter.reset("unknown"));
    }

    #[test]
    fn test_concurrent_checks_do_not_lose_updates() {
        let limiter = SlidingWindowLimiter::new(60, 100);
        let allowed = AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        if limiter.check_at("shared", 500).is_allowed() {
                            allowed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(allowed.load(Ordering::Relaxed), 100);
        assert_eq!(limiter.requests_in_window("shared", 500), 100);
    }

    #[test]
    fn test_stats() {
        let limiter = SlidingWindowLimiter::default();
        limiter.check_at("a", 0);

        let stats = limiter.get_stats();
        assert_eq!(stats["tracked_clients"], 1);
        assert_eq!(stats["window_secs"], 60);
        assert_eq!(stats["max_requests"], 100);
    }
}
