use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Full buckets untouched this long are dropped on the next reclaim scan.
const IDLE_RECLAIM: Duration = Duration::from_secs(600);

/// Reclaim scans only run once the map has grown past this size.
const RECLAIM_SCAN_THRESHOLD: usize = 1_024;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-identity token bucket with lazy refill. Process-local; multi-process
/// deployments get per-process quotas.
pub struct RateLimiter {
    enabled: bool,
    capacity: f64,
    refill_per_minute: f64,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(enabled: bool, capacity: u32, refill_per_minute: u32) -> Self {
        Self {
            enabled,
            capacity: f64::from(capacity),
            refill_per_minute: f64::from(refill_per_minute),
            buckets: DashMap::new(),
        }
    }

    /// Spend one token for `key`, refilling by elapsed time first. Returns
    /// false when the bucket is empty.
    pub fn try_acquire(&self, key: &str) -> bool {
        self.acquire_at(key, Instant::now())
    }

    fn acquire_at(&self, key: &str, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }
        self.maybe_reclaim(now);
        let mut bucket = self.buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: self.capacity,
            last_refill: now,
        });
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_minute / 60.0).min(self.capacity);
        bucket.last_refill = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets that have refilled back to capacity and sat idle; they
    /// carry no state a fresh entry would not have.
    fn maybe_reclaim(&self, now: Instant) {
        if self.buckets.len() <= RECLAIM_SCAN_THRESHOLD {
            return;
        }
        self.buckets.retain(|_, bucket| {
            let idle = now.saturating_duration_since(bucket.last_refill);
            let refilled = bucket.tokens + idle.as_secs_f64() * self.refill_per_minute / 60.0;
            idle < IDLE_RECLAIM || refilled < self.capacity
        });
    }
}
