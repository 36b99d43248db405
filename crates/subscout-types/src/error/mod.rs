//! Typed error definitions for Subscout.
//!
//! Every failure path in the pipeline produces one of these values so callers
//! can branch on the variant instead of parsing messages. All errors are:
//!
//! - **Serializable** so they can be tallied into the health artifact
//! - **Matchable** for propagation policy (retire a credential, classify a probe)

mod config;
mod pipeline;

pub use config::ConfigError;
pub use pipeline::PipelineError;
