use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use spar_core::events::SourceDoc;
use spar_core::request::SearchMode;

use crate::context::build_context;
use crate::provider::{SearchConfig, SearchOutcome, SearchProvider};

const API_URL: &str = "https://api.exa.ai/search";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const TEXT_MAX_CHARACTERS: u32 = 3000;
const SUMMARY_QUERY: &str = "Key tax implications and rulings";

const TRUSTED_DOMAINS: &[&str] = &[
    "iras.gov.sg",
    "singaporelegaladvice.com",
    "kpmg.com",
    "pwc.com",
    "ey.com",
    "deloitte.com",
];

const WIDE_EXTRA_DOMAINS: &[&str] = &[
    "taxathand.com",
    "accaglobal.com",
    "lexology.com",
    "mondaq.com",
    "tax.thomsonreuters.com",
    "internationaltaxreview.com",
    "mof.gov.sg",
    "edb.gov.sg",
];

pub struct ExaSearchProvider {
    client: Client,
    api_key: SecretString,
}

impl ExaSearchProvider {
    pub fn new(api_key: SecretString) -> Result<Self, reqwest::Error> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self { client, api_key })
    }

    fn build_body(&self, topic: &str, config: &SearchConfig) -> Value {
        let mut contents = json!({
            "text": { "maxCharacters": TEXT_MAX_CHARACTERS },
        });
        if config.include_summary {
            contents["summary"] = json!({ "query": SUMMARY_QUERY });
        }

        let mut body = json!({
            "query": format!("Singapore tax {topic}"),
            "type": config.search_type,
            "numResults": config.num_results,
            "contents": contents,
        });
        if let Some(domains) = domain_filter(config.mode) {
            body["includeDomains"] = json!(domains);
        }
        body
    }

    async fn search(&self, topic: &str, config: &SearchConfig) -> Result<SearchOutcome, SearchError> {
        let resp = self
            .client
            .post(API_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("content-type", "application/json")
            .json(&self.build_body(topic, config))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Status { status, body });
        }

        let payload: ExaResponse = resp.json().await?;
        let sources: Vec<SourceDoc> = payload
            .results
            .into_iter()
            .map(|r| SourceDoc {
                title: r.title.unwrap_or_else(|| "Untitled".to_string()),
                url: r.url,
                text: r.text,
                summary: r.summary,
            })
            .collect();
        let context = build_context(&sources);
        Ok(SearchOutcome { sources, context })
    }
}

#[async_trait]
impl SearchProvider for ExaSearchProvider {
    #[instrument(skip(self, config), fields(mode = ?config.mode, num_results = config.num_results))]
    async fn fetch_context(&self, topic: &str, config: &SearchConfig) -> SearchOutcome {
        match self.search(topic, config).await {
            Ok(outcome) => {
                debug!(sources = outcome.sources.len(), "search complete");
                outcome
            }
            Err(e) => {
                warn!(error = %e, "web search failed, continuing without context");
                SearchOutcome::empty()
            }
        }
    }
}

/// Domains the given mode restricts results to. `All` means no restriction.
fn domain_filter(mode: SearchMode) -> Option<Vec<&'static str>> {
    match mode {
        SearchMode::Trusted => Some(TRUSTED_DOMAINS.to_vec()),
        SearchMode::Wide => Some(
            TRUSTED_DOMAINS
                .iter()
                .chain(WIDE_EXTRA_DOMAINS)
                .copied()
                .collect(),
        ),
        SearchMode::All => None,
    }
}

#[derive(Debug, thiserror::Error)]
enum SearchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Deserialize)]
struct ExaResult {
    title: Option<String>,
    url: String,
    text: Option<String>,
    summary: Option<String>,
}
