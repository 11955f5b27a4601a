use serde::{Deserialize, Serialize};

/// Search breadth: which domains the provider may draw from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Trusted,
    #[default]
    Wide,
    All,
}

/// Search strategy hint passed through to the provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Fast,
    #[default]
    Auto,
    Neural,
}

/// One Best-of-N run configuration as sent by the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub id: String,
    pub minimizer_model: String,
    pub hawk_model: String,
}

/// The debate request body. Optional fields mirror the original wire
/// format; defaults are applied here so downstream code never probes.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateRequest {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub minimizer_model: Option<String>,
    #[serde(default)]
    pub hawk_model: Option<String>,
    #[serde(default)]
    pub enable_web_search: bool,
    #[serde(default)]
    pub search_mode: SearchMode,
    #[serde(default)]
    pub search_type: SearchType,
    #[serde(default = "default_num_results")]
    pub num_results: u32,
    #[serde(default)]
    pub include_summary: bool,
    /// Present and non-empty activates Best-of-N mode.
    #[serde(default)]
    pub run_configs: Option<Vec<RunConfig>>,
}

fn default_num_results() -> u32 {
    5
}

impl DebateRequest {
    pub fn is_multi_run(&self) -> bool {
        self.run_configs.as_ref().is_some_and(|c| !c.is_empty())
    }
}
