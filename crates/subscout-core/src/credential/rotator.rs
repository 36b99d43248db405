use std::collections::HashMap;
use subscout_types::{Credential, CredentialStatus, CredentialUsage, PipelineError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::selection_helpers::pick_best;
use crate::modules::file_utils::truncate_reason;

/// Quota reported by a backend's account endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountQuota {
    pub searches_left: u32,
    pub searches_per_month: u32,
    pub active: bool,
}

struct RotatorState {
    credentials: Vec<Credential>,
    /// Acquired but not yet settled calls, per credential id
    in_flight: HashMap<String, u32>,
}

impl RotatorState {
    fn headroom(&self, c: &Credential) -> u32 {
        c.remaining().saturating_sub(self.in_flight.get(&c.id).copied().unwrap_or(0))
    }

    fn release(&mut self, id: &str) {
        if let Some(n) = self.in_flight.get_mut(id) {
            *n = n.saturating_sub(1);
        }
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Credential> {
        self.credentials.iter_mut().find(|c| c.id == id)
    }
}

/// Hands out the credential with the most headroom for each discovery call.
///
/// All ledger mutations go through one mutex, so concurrent discovery calls
/// see a serialized view. Each acquired credential holds a one-search
/// reservation until `record_usage`, `record_failure` or `release` settles it,
/// which keeps concurrent callers from overdrawing the last searches.
pub struct QuotaAwareRotator {
    state: Mutex<RotatorState>,
    min_searches_left: u32,
}

impl QuotaAwareRotator {
    pub fn new(credentials: Vec<Credential>, min_searches_left: u32) -> Self {
        Self {
            state: Mutex::new(RotatorState { credentials, in_flight: HashMap::new() }),
            min_searches_left,
        }
    }

    /// Select the active credential with the largest headroom; ties go to the
    /// earliest `reset_at`.
    pub async fn acquire_credential(&self) -> Result<Credential, PipelineError> {
        let mut state = self.state.lock().await;
        let idx = pick_best(&state.credentials, |c| state.headroom(c))
            .ok_or(PipelineError::NoCredentialAvailable)?;
        let credential = state.credentials[idx].clone();
        *state.in_flight.entry(credential.id.clone()).or_insert(0) += 1;
        debug!(
            credential = %credential.masked_secret(),
            remaining = credential.remaining(),
            "Acquired search credential"
        );
        Ok(credential)
    }

    /// Charge `cost` searches to a credential after a successful call.
    pub async fn record_usage(&self, credential: &Credential, cost: u32) {
        let mut state = self.state.lock().await;
        state.release(&credential.id);
        let Some(c) = state.find_mut(&credential.id) else { return };
        c.searches_used = c.searches_used.saturating_add(cost);
        if c.searches_used >= c.searches_quota && c.status == CredentialStatus::Active {
            c.status = CredentialStatus::Exhausted;
            info!(credential = %c.masked_secret(), "Credential reached its quota");
        }
    }

    /// Settle a failed call. Quota and auth rejections retire the credential.
    pub async fn record_failure(&self, credential: &Credential, error: &PipelineError) {
        let mut state = self.state.lock().await;
        state.release(&credential.id);
        let Some(c) = state.find_mut(&credential.id) else { return };
        c.last_error = Some(truncate_reason(&error.to_string(), 200));
        match error {
            PipelineError::CredentialExhausted { .. } => {
                c.status = CredentialStatus::Exhausted;
                c.searches_used = c.searches_used.max(c.searches_quota);
                warn!(credential = %c.masked_secret(), "Backend reports credential exhausted");
            }
            PipelineError::CredentialInvalid { .. } => {
                c.status = CredentialStatus::Invalid;
                warn!(credential = %c.masked_secret(), "Backend rejected credential, marking invalid");
            }
            _ => {}
        }
    }

    /// Drop a reservation without charging (call abandoned).
    pub async fn release(&self, credential: &Credential) {
        self.state.lock().await.release(&credential.id);
    }

    /// Overwrite quota counters with the backend's own view.
    pub async fn apply_account_quota(&self, credential_id: &str, quota: AccountQuota) {
        let mut state = self.state.lock().await;
        let Some(c) = state.find_mut(credential_id) else { return };
        if c.status == CredentialStatus::Invalid {
            return;
        }
        if quota.searches_per_month > 0 {
            c.searches_quota = quota.searches_per_month;
        }
        c.searches_used = c.searches_quota.saturating_sub(quota.searches_left);
        c.status = if quota.active && quota.searches_left > 0 {
            CredentialStatus::Active
        } else {
            CredentialStatus::Exhausted
        };
        debug!(
            credential = %c.masked_secret(),
            left = quota.searches_left,
            "Refreshed quota from account endpoint"
        );
    }

    /// Summed headroom of every selectable credential.
    pub async fn total_headroom(&self) -> u32 {
        let state = self.state.lock().await;
        state
            .credentials
            .iter()
            .filter(|c| c.is_selectable())
            .map(|c| state.headroom(c))
            .fold(0_u32, u32::saturating_add)
    }

    /// Fails with `NoCredentialAvailable` when discovery should not start.
    pub async fn discovery_gate(&self) -> Result<(), PipelineError> {
        let headroom = self.total_headroom().await;
        if headroom == 0 || headroom < self.min_searches_left {
            return Err(PipelineError::NoCredentialAvailable);
        }
        Ok(())
    }

    pub async fn snapshot(&self) -> Vec<Credential> {
        self.state.lock().await.credentials.clone()
    }

    pub async fn usage(&self) -> Vec<CredentialUsage> {
        self.state.lock().await.credentials.iter().map(Credential::usage).collect()
    }
}
