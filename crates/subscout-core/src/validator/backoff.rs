//! Per-URL backoff and quarantine state machine.
//!
//! ```text
//! eligible ──probe──► alive ─┐ failures = 0, backoff = floor
//!    ▲                       │
//!    │      ┌──────────► dead ─┐ failures += 1
//!    │      │                  │ next = now + min(ceiling, floor · 2^failures)
//!    └──────┴── now ≥ next ◄───┘ failures > threshold ⇒ quarantined (never probed)
//! ```

use chrono::{DateTime, Duration, Utc};
use subscout_types::{CandidateUrl, ProbeFailureKind};

/// Upper bound on any configured ceiling (ten years).
const MAX_CEILING_SECS: u64 = 10 * 365 * 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub floor_secs: u64,
    pub ceiling_secs: u64,
    pub quarantine_threshold: u32,
}

impl BackoffPolicy {
    pub fn new(floor_secs: u64, ceiling_secs: u64, quarantine_threshold: u32) -> Self {
        let floor_secs = floor_secs.min(MAX_CEILING_SECS);
        let ceiling_secs = ceiling_secs.clamp(floor_secs, MAX_CEILING_SECS);
        Self { floor_secs, ceiling_secs, quarantine_threshold }
    }

    /// Re-probe delay after the `failures`-th consecutive failure.
    pub fn delay_secs(&self, failures: u32) -> u64 {
        let factor = 1_u64.checked_shl(failures).unwrap_or(u64::MAX);
        self.floor_secs.saturating_mul(factor).min(self.ceiling_secs)
    }

    pub fn on_success(&self, candidate: &mut CandidateUrl, now: DateTime<Utc>, latency_ms: u64) {
        candidate.consecutive_failures = 0;
        candidate.backoff_secs = self.floor_secs;
        candidate.next_eligible_probe = None;
        candidate.last_failure = None;
        candidate.last_probe = Some(now);
        candidate.last_success = Some(now);
        candidate.last_seen = now;
        candidate.last_latency_ms = Some(latency_ms);
    }

    pub fn on_failure(&self, candidate: &mut CandidateUrl, now: DateTime<Utc>, kind: ProbeFailureKind) {
        candidate.consecutive_failures = candidate.consecutive_failures.saturating_add(1);
        let delay = self.delay_secs(candidate.consecutive_failures);
        candidate.backoff_secs = delay;
        candidate.next_eligible_probe = Some(now + Duration::seconds(delay as i64));
        candidate.last_failure = Some(kind);
        candidate.last_probe = Some(now);
        candidate.last_seen = now;
        if candidate.consecutive_failures > self.quarantine_threshold {
            candidate.quarantined = true;
        }
    }
}
