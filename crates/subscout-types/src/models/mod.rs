//! Core domain models for Subscout.
//!
//! This module contains all shared data structures used across the pipeline.

mod candidate;
mod config;
mod credential;
mod node;
mod report;
mod snapshot;

pub use candidate::{
    url_host, CandidateUrl, DiscoverySource, ProbeFailureKind, ProbeOutcome, ValidationResult,
};
pub use config::{DiscoveryConfig, PipelineConfig, DEFAULT_SIGNATURE};
pub use credential::{mask_secret, Credential, CredentialSpec, CredentialStatus, CredentialUsage};
pub use node::{CanonicalKey, Protocol, ProxyNode};
pub use report::{DiscoveryMode, ErrorTally, HealthSummary, TrafficInfo, UrlMeta};
pub use snapshot::{DailyCounters, RunSnapshot, SNAPSHOT_VERSION};
