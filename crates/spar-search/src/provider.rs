use async_trait::async_trait;

use spar_core::events::SourceDoc;
use spar_core::request::{DebateRequest, SearchMode, SearchType};

/// Result count bounds enforced regardless of what the request asked for.
pub const MIN_RESULTS: u32 = 3;
pub const MAX_RESULTS: u32 = 15;

/// Search parameters extracted from a debate request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchConfig {
    pub mode: SearchMode,
    pub search_type: SearchType,
    pub num_results: u32,
    pub include_summary: bool,
}

impl SearchConfig {
    /// Pull the search knobs out of a request, clamping the result count.
    pub fn from_request(request: &DebateRequest) -> Self {
        Self {
            mode: request.search_mode,
            search_type: request.search_type,
            num_results: request.num_results.clamp(MIN_RESULTS, MAX_RESULTS),
            include_summary: request.include_summary,
        }
    }
}

/// What a search produced: the raw documents plus the assembled context
/// block handed to each generation task.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchOutcome {
    pub sources: Vec<SourceDoc>,
    pub context: String,
}

impl SearchOutcome {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// The web-search collaborator. Fetching context is infallible: any
/// provider failure collapses to an empty outcome so the debate proceeds
/// without reference material.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn fetch_context(&self, topic: &str, config: &SearchConfig) -> SearchOutcome;
}

/// Returns the same canned outcome on every call. Test double.
#[derive(Clone, Debug, Default)]
pub struct StaticSearchProvider {
    outcome: SearchOutcome,
}

impl StaticSearchProvider {
    pub fn new(outcome: SearchOutcome) -> Self {
        Self { outcome }
    }
}

#[async_trait]
impl SearchProvider for StaticSearchProvider {
    async fn fetch_context(&self, _topic: &str, _config: &SearchConfig) -> SearchOutcome {
        self.outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_results(n: u32) -> DebateRequest {
        DebateRequest {
            topic: "stamp duty".into(),
            num_results: n,
            ..DebateRequest::default()
        }
    }

    #[test]
    fn num_results_clamped_low() {
        let config = SearchConfig::from_request(&request_with_results(1));
        assert_eq!(config.num_results, 3);
    }

    #[test]
    fn num_results_clamped_high() {
        let config = SearchConfig::from_request(&request_with_results(100));
        assert_eq!(config.num_results, 15);
    }

    #[test]
    fn num_results_in_range_untouched() {
        let config = SearchConfig::from_request(&request_with_results(7));
        assert_eq!(config.num_results, 7);
    }

    #[test]
    fn defaults_flow_through() {
        let config = SearchConfig::from_request(&request_with_results(5));
        assert_eq!(config.mode, SearchMode::Wide);
        assert_eq!(config.search_type, SearchType::Auto);
        assert!(!config.include_summary);
    }
}
