//! Search credentials: the persisted ledger and the quota-aware rotator.
//!
//! [`CredentialStore`] owns the load/persist lifecycle. During a run the
//! credentials move into a [`QuotaAwareRotator`]; at run end the rotator's
//! snapshot is absorbed back and persisted once.

mod reset_schedule;
mod rotator;
mod selection_helpers;

#[cfg(test)]
mod tests;

pub use reset_schedule::{next_reset_at, next_reset_date};
pub use rotator::{AccountQuota, QuotaAwareRotator};
pub use selection_helpers::{compare_by_headroom, pick_best};

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use subscout_types::{Credential, CredentialSpec, CredentialStatus};
use tracing::{info, warn};

use crate::error::AppResult;
use crate::modules::config::secret_hash;
use crate::modules::file_utils::{atomic_write_json, read_json_or_set_aside};

pub const LEDGER_FILE: &str = "credentials_state.json";

/// Stable credential id: first 12 hex characters of SHA-256(secret).
pub fn fingerprint(secret: &str) -> String {
    secret_hash(secret).chars().take(12).collect()
}

fn is_well_formed(secret: &str) -> bool {
    !secret.is_empty() && secret.chars().all(|c| c.is_ascii_graphic())
}

pub struct CredentialStore {
    path: PathBuf,
    credentials: Vec<Credential>,
    offset: FixedOffset,
}

impl CredentialStore {
    /// Build the credential set from `specs`, applying the persisted ledger
    /// and rolling over any quota period that ended before `now`. A ledger
    /// that cannot be read is set aside and every credential starts fresh.
    pub async fn load(
        data_dir: &Path,
        specs: &[CredentialSpec],
        default_quota: u32,
        offset: FixedOffset,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let path = data_dir.join(LEDGER_FILE);
        let ledger: Vec<Credential> = match read_json_or_set_aside(&path, "Credential ledger").await {
            Ok(ledger) => ledger.unwrap_or_default(),
            Err(e) => {
                warn!("Credential ledger not loaded ({}), starting from declared credentials", e);
                Vec::new()
            }
        };
        let mut by_id: HashMap<String, Credential> =
            ledger.into_iter().map(|c| (c.id.clone(), c)).collect();

        let mut credentials = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            let secret = spec.value.trim().to_string();
            let id = fingerprint(&secret);
            let mut credential = by_id.remove(&id).unwrap_or_else(|| Credential {
                id: id.clone(),
                secret: String::new(),
                searches_used: 0,
                searches_quota: default_quota,
                reset_at: spec
                    .reset_date
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .and_then(|n| offset.from_local_datetime(&n).single())
                    .map_or_else(
                        || next_reset_at(now, spec.registered_on, index, offset),
                        |dt| dt.with_timezone(&Utc),
                    ),
                status: CredentialStatus::Active,
                registered_on: spec.registered_on,
                last_error: None,
            });
            credential.secret = secret;
            if let Some(quota) = spec.quota {
                credential.searches_quota = quota;
            }
            if spec.registered_on.is_some() {
                credential.registered_on = spec.registered_on;
            }
            if !is_well_formed(&credential.secret) {
                credential.status = CredentialStatus::Invalid;
                credential.last_error = Some("malformed secret".to_string());
            }
            credentials.push(credential);
        }

        let mut store = Self { path, credentials, offset };
        store.roll_over(now);
        info!(
            "Loaded {} credential(s), {} active",
            store.credentials.len(),
            store.credentials.iter().filter(|c| c.is_selectable()).count()
        );
        Ok(store)
    }

    /// Start a new quota period for every credential whose `reset_at` passed.
    /// Invalid credentials keep their status.
    fn roll_over(&mut self, now: DateTime<Utc>) {
        for (index, c) in self.credentials.iter_mut().enumerate() {
            if c.reset_at > now {
                continue;
            }
            if c.status != CredentialStatus::Invalid {
                c.status = CredentialStatus::Active;
                c.searches_used = 0;
                c.last_error = None;
            }
            c.reset_at = next_reset_at(now, c.registered_on, index, self.offset);
        }
    }

    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    pub fn rotator(&self, min_searches_left: u32) -> QuotaAwareRotator {
        QuotaAwareRotator::new(self.credentials.clone(), min_searches_left)
    }

    /// Take back the ledger state mutated during the run.
    pub fn absorb(&mut self, credentials: Vec<Credential>) {
        self.credentials = credentials;
    }

    /// Manually re-activate an `invalid` or `exhausted` credential by id prefix.
    /// Returns the matched id.
    pub fn reset(&mut self, id_prefix: &str) -> Option<String> {
        let mut matches = self.credentials.iter_mut().filter(|c| c.id.starts_with(id_prefix));
        let c = matches.next()?;
        if matches.next().is_some() {
            warn!("Credential prefix '{}' is ambiguous", id_prefix);
            return None;
        }
        c.status = CredentialStatus::Active;
        c.last_error = None;
        if c.searches_used >= c.searches_quota {
            c.searches_used = 0;
        }
        Some(c.id.clone())
    }

    pub async fn persist(&self) -> AppResult<()> {
        atomic_write_json(&self.path, &self.credentials).await
    }
}
