//! Per-destination-host rate limiting, independent of the global worker bound.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

struct HostSlot {
    permits: Arc<Semaphore>,
    next_start: Mutex<Option<Instant>>,
}

/// Caps concurrent probes per host and spaces their start times.
pub struct HostRateLimiter {
    per_host: usize,
    min_interval: Duration,
    hosts: DashMap<String, Arc<HostSlot>>,
}

impl HostRateLimiter {
    pub fn new(per_host: usize, min_interval: Duration) -> Self {
        Self { per_host: per_host.max(1), min_interval, hosts: DashMap::new() }
    }

    fn slot(&self, host: &str) -> Arc<HostSlot> {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(HostSlot {
                    permits: Arc::new(Semaphore::new(self.per_host)),
                    next_start: Mutex::new(None),
                })
            })
            .clone()
    }

    /// Wait for a slot on `host`. The permit is held until dropped.
    pub async fn acquire(&self, host: &str) -> Option<OwnedSemaphorePermit> {
        let slot = self.slot(host);
        let permit = Arc::clone(&slot.permits).acquire_owned().await.ok()?;

        let wait_until = {
            let mut next = slot.next_start.lock();
            let now = Instant::now();
            let start = next.map_or(now, |t| t.max(now));
            *next = Some(start + self.min_interval);
            start
        };
        tokio::time::sleep_until(wait_until).await;
        Some(permit)
    }

    pub fn tracked_hosts(&self) -> usize {
        self.hosts.len()
    }
}
