//! # Subscout Core
//!
//! The discovery → validate → extract → dedupe pipeline.
//!
//! ```text
//! subscout-core/src/
//! ├── credential/   # CredentialStore + QuotaAwareRotator
//! ├── discovery/    # URLDiscoveryService, search backends, URL normalization
//! ├── history/      # HistoryStore (RunSnapshot load/persist, diffs)
//! ├── validator/    # SubscriptionValidator, backoff state machine, host limiter
//! ├── extract/      # NodeExtractor/Classifier, decoders, canonicalization
//! ├── aggregate.rs  # Deduplicator/Aggregator
//! ├── pipeline/     # Run orchestration and artifact writing
//! └── modules/      # config loading, logging, file utilities
//! ```
//!
//! Stores are explicit service objects with a load/persist lifecycle; nothing
//! lives in module-level globals.

#![allow(
    clippy::significant_drop_tightening,
    reason = "Mutex guards in async code require careful lifetime management"
)]
#![allow(clippy::map_err_ignore, reason = "Error context is provided in the replacement message")]
#![allow(
    clippy::module_name_repetitions,
    reason = "Type names mirror the pipeline component names"
)]
// Test-only lints: allow panic!, println!, etc. in test code
#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::print_stdout,
        clippy::float_cmp,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::needless_collect
    )
)]

pub mod aggregate;
pub mod credential;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod history;
pub mod modules;
pub mod pipeline;
pub mod validator;

// Re-export commonly used types
pub use aggregate::{aggregate, prioritize, AggregateOutcome, SourceNodes, SourceTier};
pub use credential::{CredentialStore, QuotaAwareRotator};
pub use discovery::{DiscoveryOutcome, DiscoveryService};
pub use error::{AppError, AppResult};
pub use extract::{Extraction, NodeExtractor};
pub use history::HistoryStore;
pub use pipeline::{Pipeline, RunOptions, RunReport};
pub use validator::{BackoffPolicy, SubscriptionValidator, ValidationBatch};
