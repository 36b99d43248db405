use async_trait::async_trait;
use subscout_types::{Credential, DiscoverySource, PipelineError};

use crate::credential::AccountQuota;

/// Raw material returned by one backend query, scanned for URLs by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    /// Snippets, titles and fetched page bodies
    pub texts: Vec<String>,
    /// Result links
    pub links: Vec<String>,
    /// Searches charged against the credential
    pub cost: u32,
}

/// An external search surface.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Tag applied to candidates found through this backend.
    fn source(&self) -> DiscoverySource;

    /// Whether each query must go through the rotator.
    fn requires_credential(&self) -> bool;

    /// Queries to issue for one discovery cycle.
    fn queries(&self, signature: &str, extra: &[String]) -> Vec<String>;

    async fn search(
        &self,
        query: &str,
        credential: Option<&Credential>,
    ) -> Result<SearchPage, PipelineError>;

    /// Remaining quota as reported by the backend, when it exposes one.
    async fn account_quota(
        &self,
        _credential: &Credential,
    ) -> Result<Option<AccountQuota>, PipelineError> {
        Ok(None)
    }
}

/// Queries built from the signature: quoted path with the token parameter,
/// the bare path, and an `inurl:` form, followed by configured extras.
pub fn signature_queries(signature: &str, extra: &[String]) -> Vec<String> {
    let sig = signature.trim_matches('/');
    let mut queries = vec![
        format!("\"{}?token=\"", sig),
        format!("\"{}\"", sig),
        format!("inurl:\"{}\"", sig),
    ];
    for q in extra {
        if !queries.contains(q) {
            queries.push(q.clone());
        }
    }
    queries
}
