//! Pipeline stage errors.
//!
//! Per-URL and per-line errors are recorded and counted but never abort a run.
//! Credential and discovery errors degrade discovery to a no-op. None of these
//! abort a run; only an output failure in the core crate does.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ProbeFailureKind;

/// Errors produced by the discovery, validation and extraction stages.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum PipelineError {
    /// The backend reported that the credential has no searches left
    #[error("Credential {credential} exhausted its search quota")]
    CredentialExhausted {
        /// Masked credential secret
        credential: String,
    },

    /// The backend rejected the credential (bad format or auth failure)
    #[error("Credential {credential} rejected: {message}")]
    CredentialInvalid {
        /// Masked credential secret
        credential: String,
        /// Backend-supplied reason
        message: String,
    },

    /// No active credential with remaining headroom exists
    #[error("No search credential available")]
    NoCredentialAvailable,

    /// The search backend could not be reached or answered with a server error
    #[error("Discovery backend {backend} unavailable: {message}")]
    DiscoveryUnavailable {
        /// Backend name (`search`, `code-host`)
        backend: String,
        /// Transport or status detail
        message: String,
    },

    /// A probe exceeded its timeout or was cancelled by the run deadline
    #[error("Probe of {url} timed out after {timeout_secs}s")]
    ProbeTimeout {
        /// Probed URL
        url: String,
        /// Configured per-probe timeout
        timeout_secs: u64,
    },

    /// A probe could not connect
    #[error("Probe of {url} failed to connect: {message}")]
    ProbeConnectionError {
        /// Probed URL
        url: String,
        /// Transport error detail
        message: String,
    },

    /// A probe completed with a non-success status or an empty body
    #[error("Probe of {url} returned HTTP {status}")]
    ProbeHttpError {
        /// Probed URL
        url: String,
        /// Response status code
        status: u16,
    },

    /// A reachable body yielded zero valid node lines
    #[error("Subscription {url} yielded no valid nodes")]
    ExtractionEmpty {
        /// Source URL
        url: String,
    },

    /// A single node line could not be canonicalized
    #[error("Malformed {protocol} line: {reason}")]
    MalformedNodeLine {
        /// Protocol tag derived from the line prefix
        protocol: String,
        /// What was wrong with it
        reason: String,
    },
}

impl PipelineError {
    /// Stable snake_case name used as the tally key in the health summary.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CredentialExhausted { .. } => "credential_exhausted",
            Self::CredentialInvalid { .. } => "credential_invalid",
            Self::NoCredentialAvailable => "no_credential_available",
            Self::DiscoveryUnavailable { .. } => "discovery_unavailable",
            Self::ProbeTimeout { .. } => "probe_timeout",
            Self::ProbeConnectionError { .. } => "probe_connection_error",
            Self::ProbeHttpError { .. } => "probe_http_error",
            Self::ExtractionEmpty { .. } => "extraction_empty",
            Self::MalformedNodeLine { .. } => "malformed_node_line",
        }
    }

    /// Returns true if the error takes the offending credential out of rotation.
    pub fn should_retire_credential(&self) -> bool {
        matches!(self, Self::CredentialExhausted { .. } | Self::CredentialInvalid { .. })
    }

    /// Probe failure classification, if this is a probe error.
    pub fn probe_failure_kind(&self) -> Option<ProbeFailureKind> {
        match self {
            Self::ProbeTimeout { .. } => Some(ProbeFailureKind::Timeout),
            Self::ProbeConnectionError { .. } => Some(ProbeFailureKind::ConnectionRefused),
            Self::ProbeHttpError { .. } => Some(ProbeFailureKind::HttpError),
            _ => None,
        }
    }
}
