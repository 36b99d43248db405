//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::credential::CredentialSpec;
use crate::error::ConfigError;

/// Default content signature: the token-bearing subscribe path of common panels.
pub const DEFAULT_SIGNATURE: &str = "api/v1/client/subscribe";

/// Full pipeline configuration.
///
/// Loaded from `subscout.json`, overlaid with `SUBSCOUT_*` environment
/// variables, then with CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct PipelineConfig {
    /// Path fragment every subscription URL must contain
    #[validate(length(min = 1_u64))]
    pub signature: String,
    /// URLs probed every run in addition to history
    pub seed_urls: Vec<String>,
    /// Global bound on concurrent probes
    #[validate(range(min = 1_usize, max = 256_usize))]
    pub worker_pool_size: usize,
    /// Concurrent probes allowed against a single host
    #[validate(range(min = 1_usize, max = 32_usize))]
    pub per_host_concurrency: usize,
    /// Minimum spacing between probe starts against a single host
    pub per_host_interval_ms: u64,
    /// Per-probe timeout in seconds
    #[validate(range(min = 1_u64, max = 300_u64))]
    pub probe_timeout_secs: u64,
    /// Run-level deadline for all probes in seconds
    #[validate(range(min = 1_u64, max = 86_400_u64))]
    pub run_deadline_secs: u64,
    /// Backoff floor in seconds
    #[validate(range(min = 1_u64))]
    pub backoff_floor_secs: u64,
    /// Backoff ceiling in seconds
    #[validate(range(min = 1_u64))]
    pub backoff_ceiling_secs: u64,
    /// Failures beyond this count quarantine a URL
    #[validate(range(min = 1_u32, max = 1000_u32))]
    pub quarantine_threshold: u32,
    /// Output node cap; `None` keeps every node
    pub max_nodes: Option<usize>,
    /// Canonical-key deduplication (off only for diagnostics)
    pub dedup: bool,
    /// Bodies beyond this size are truncated before extraction
    #[validate(range(min = 1024_usize))]
    pub max_body_bytes: usize,
    pub user_agent: String,
    /// Offset of the reporting day buckets from UTC, in hours (-12..=14)
    pub utc_offset_hours: i32,
    /// Number of day buckets retained
    #[validate(range(min = 1_usize, max = 3650_usize))]
    pub history_days: usize,
    #[validate(nested)]
    pub discovery: DiscoveryConfig,
    /// Credentials supplied in the config object (lowest precedence)
    pub credentials: Vec<CredentialSpec>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            signature: DEFAULT_SIGNATURE.to_string(),
            seed_urls: Vec::new(),
            worker_pool_size: 32,
            per_host_concurrency: 2,
            per_host_interval_ms: 250,
            probe_timeout_secs: 10,
            run_deadline_secs: 600,
            backoff_floor_secs: 3600,
            backoff_ceiling_secs: 7 * 86_400,
            quarantine_threshold: 8,
            max_nodes: None,
            dedup: true,
            max_body_bytes: 5 * 1024 * 1024,
            user_agent: format!("subscout/{}", env!("CARGO_PKG_VERSION")),
            utc_offset_hours: 8,
            history_days: 60,
            discovery: DiscoveryConfig::default(),
            credentials: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Cross-field checks the derive cannot express.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.backoff_floor_secs > self.backoff_ceiling_secs {
            return Err(ConfigError::invalid(
                "backoff_floor_secs",
                format!(
                    "floor {}s exceeds ceiling {}s",
                    self.backoff_floor_secs, self.backoff_ceiling_secs
                ),
            ));
        }
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(ConfigError::invalid(
                "utc_offset_hours",
                format!("offset {} is outside -12..=14", self.utc_offset_hours),
            ));
        }
        if self.max_nodes == Some(0) {
            return Err(ConfigError::invalid("max_nodes", "cap must be at least 1 when set"));
        }
        Ok(())
    }
}

/// Discovery backends configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "Configuration struct - bools are intentional feature flags"
)]
pub struct DiscoveryConfig {
    /// Run discovery at all
    pub enabled: bool,
    /// Also scan the code host (uncredentialed)
    pub code_host: bool,
    /// Web search API base URL
    #[validate(url)]
    pub search_base_url: String,
    /// Code host base URL
    #[validate(url)]
    pub code_host_base_url: String,
    /// Queries issued in addition to the ones built from the signature
    pub extra_queries: Vec<String>,
    /// Results requested per web search call
    #[validate(range(min = 1_u32, max = 100_u32))]
    pub results_per_query: u32,
    /// Search time range (`qdr:d`, `qdr:w`, `qdr:m`)
    pub time_range: String,
    /// Result pages fetched and scanned per query (0 = snippets only)
    #[validate(range(max = 20_usize))]
    pub max_pages_per_query: usize,
    /// Skip discovery when total remaining searches drop below this
    pub min_searches_left: u32,
    /// Quota assumed for credentials that do not declare one
    #[validate(range(min = 1_u32))]
    pub default_quota: u32,
    /// Refresh quotas from the backend account endpoint at run start
    pub refresh_quotas: bool,
    /// Code-host search paths (relative to the base URL)
    pub code_host_searches: Vec<String>,
    /// Issue pages followed per code-host search
    #[validate(range(min = 1_usize, max = 50_usize))]
    pub per_search_limit: usize,
    /// Delay between code-host page fetches
    pub request_delay_ms: u64,
    /// Concurrent backend queries
    #[validate(range(min = 1_usize, max = 16_usize))]
    pub query_concurrency: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            code_host: false,
            search_base_url: "https://serpapi.com".to_string(),
            code_host_base_url: "https://github.com".to_string(),
            extra_queries: Vec::new(),
            results_per_query: 20,
            time_range: "qdr:w".to_string(),
            max_pages_per_query: 0,
            min_searches_left: 0,
            default_quota: 100,
            refresh_quotas: true,
            code_host_searches: vec![
                "/search?q=%22api%2Fv1%2Fclient%2Fsubscribe%3Ftoken%3D%22&type=issues&s=updated&o=desc"
                    .to_string(),
                "/search?q=%22api%2Fv1%2Fclient%2Fsubscribe%3Ftoken%3D%22&type=code".to_string(),
            ],
            per_search_limit: 10,
            request_delay_ms: 1000,
            query_concurrency: 4,
        }
    }
}
