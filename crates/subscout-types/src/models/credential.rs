//! Search-backend credential models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of secret characters shown before the mask.
const MASK_VISIBLE_CHARS: usize = 6;

/// Rotation status of a credential.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    /// Eligible for selection while it has headroom
    #[default]
    Active,
    /// Quota used up; re-evaluated after `reset_at`
    Exhausted,
    /// Rejected by the backend; stays out until manually reset
    Invalid,
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialStatus::Active => write!(f, "active"),
            CredentialStatus::Exhausted => write!(f, "exhausted"),
            CredentialStatus::Invalid => write!(f, "invalid"),
        }
    }
}

/// A search-backend credential with its usage ledger.
///
/// The secret is never written to disk; the persisted ledger is keyed by `id`,
/// a fingerprint of the secret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    /// Stable fingerprint of the secret
    pub id: String,
    /// Secret material (never serialized)
    #[serde(skip_serializing, default)]
    pub secret: String,
    /// Searches consumed in the current quota period
    pub searches_used: u32,
    /// Searches allowed per quota period
    pub searches_quota: u32,
    /// When the quota period rolls over
    pub reset_at: DateTime<Utc>,
    /// Rotation status
    #[serde(default)]
    pub status: CredentialStatus,
    /// Registration date, anchors the monthly reset day
    #[serde(default)]
    pub registered_on: Option<NaiveDate>,
    /// Last backend error, for the ledger view
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Credential {
    /// Remaining searches in the current period.
    pub fn remaining(&self) -> u32 {
        self.searches_quota.saturating_sub(self.searches_used)
    }

    /// Whether the rotator may hand this credential out.
    pub fn is_selectable(&self) -> bool {
        self.status == CredentialStatus::Active && self.searches_used < self.searches_quota
    }

    /// Secret with everything past the first few characters hidden.
    pub fn masked_secret(&self) -> String {
        mask_secret(&self.secret)
    }

    /// Snapshot for the health summary.
    pub fn usage(&self) -> CredentialUsage {
        CredentialUsage {
            id: self.id.clone(),
            masked: self.masked_secret(),
            used: self.searches_used,
            quota: self.searches_quota,
            remaining: self.remaining(),
            status: self.status,
            reset_at: self.reset_at,
            last_error: self.last_error.clone(),
        }
    }
}

/// Mask a secret for logs and artifacts.
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() <= MASK_VISIBLE_CHARS {
        return "…".to_string();
    }
    let mut s: String = secret.chars().take(MASK_VISIBLE_CHARS).collect();
    s.push('…');
    s
}

/// A credential as supplied by configuration, before ledger state is applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CredentialSpec {
    /// Secret value
    pub value: String,
    /// Declared quota; falls back to the configured default
    #[serde(default)]
    pub quota: Option<u32>,
    /// Explicit next reset date
    #[serde(default)]
    pub reset_date: Option<NaiveDate>,
    /// Registration date, anchors the monthly reset day
    #[serde(default)]
    pub registered_on: Option<NaiveDate>,
}

impl CredentialSpec {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into(), ..Self::default() }
    }
}

/// Masked credential usage, as reported in `health.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialUsage {
    pub id: String,
    pub masked: String,
    pub used: u32,
    pub quota: u32,
    pub remaining: u32,
    pub status: CredentialStatus,
    pub reset_at: DateTime<Utc>,
    pub last_error: Option<String>,
}
