//! # Subscout Types
//!
//! Core types, models, and error definitions for Subscout.
//!
//! - **`error`** - Typed error taxonomy for the pipeline and configuration
//! - **`models`** - Domain models (Credential, CandidateUrl, ProxyNode, RunSnapshot)
//!
//! ## Architecture Role
//!
//! ```text
//!          subscout-types (this crate)
//!                  │
//!                  ▼
//!            subscout-core
//!                  │
//!                  ▼
//!            subscout-cli
//! ```
//!
//! Everything here is plain data: serializable with serde, cheap to clone
//! across task boundaries, and free of I/O.

pub mod error;
pub mod models;

pub use error::{ConfigError, PipelineError};

pub use models::{
    CandidateUrl, CanonicalKey, Credential, CredentialSpec, CredentialStatus, CredentialUsage,
    DailyCounters, DiscoveryConfig, DiscoveryMode, DiscoverySource, ErrorTally, HealthSummary,
    PipelineConfig, ProbeFailureKind, ProbeOutcome, Protocol, ProxyNode, RunSnapshot, TrafficInfo,
    UrlMeta, ValidationResult, DEFAULT_SIGNATURE, SNAPSHOT_VERSION,
};
pub use models::{mask_secret, url_host};
