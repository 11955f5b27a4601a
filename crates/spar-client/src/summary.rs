use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use spar_core::events::SourceDoc;
use spar_core::ids::RunId;
use spar_core::persona::PersonaRole;
use spar_store::{DebateRepo, PersonaResponse, RunRecord};

use crate::replay::DebateReplay;

/// The summarization collaborator, one call per completed buffer.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        content: &str,
        persona_id: PersonaRole,
    ) -> Result<String, SummaryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Posts each buffer to the server's `/api/summarize` endpoint.
pub struct RemoteSummarizer {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteSummarizer {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct SummarizeResponse {
    summary: String,
}

#[async_trait]
impl Summarizer for RemoteSummarizer {
    async fn summarize(
        &self,
        content: &str,
        persona_id: PersonaRole,
    ) -> Result<String, SummaryError> {
        let resp = self
            .client
            .post(format!("{}/api/summarize", self.base_url))
            .json(&json!({ "content": content, "personaId": persona_id }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SummaryError::Status { status, body });
        }

        let payload: SummarizeResponse = resp.json().await?;
        Ok(payload.summary)
    }
}

/// One persona's final state within an assembled debate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinishedPersona {
    pub role: PersonaRole,
    pub model: String,
    pub response: String,
    pub summary: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinishedRun {
    pub id: RunId,
    pub personas: Vec<FinishedPersona>,
}

/// A completed, summarized debate ready for persistence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinishedDebate {
    pub topic: String,
    pub is_multi_run: bool,
    pub runs: Vec<FinishedRun>,
    pub sources: Vec<SourceDoc>,
}

/// Fans one summarization request out per non-empty buffer, concurrently.
/// Failures are logged and the affected summary omitted; the fan-out
/// never fails as a whole.
pub struct SummaryFanout<'a> {
    summarizer: &'a dyn Summarizer,
}

impl<'a> SummaryFanout<'a> {
    pub fn new(summarizer: &'a dyn Summarizer) -> Self {
        Self { summarizer }
    }

    pub async fn run(&self, replay: &DebateReplay, topic: &str) -> FinishedDebate {
        let requests: Vec<(&RunId, PersonaRole, &String)> = replay
            .buffers()
            .iter()
            .filter(|(_, buffer)| !buffer.is_empty())
            .map(|((run_id, role), buffer)| (run_id, *role, buffer))
            .collect();

        let results = join_all(requests.iter().map(|(run_id, role, buffer)| async move {
            let outcome = self.summarizer.summarize(buffer, *role).await;
            ((*run_id).clone(), *role, outcome)
        }))
        .await;

        let mut summaries: HashMap<(RunId, PersonaRole), String> = HashMap::new();
        for (run_id, role, outcome) in results {
            match outcome {
                Ok(summary) => {
                    summaries.insert((run_id, role), summary);
                }
                Err(e) => {
                    warn!(run_id = %run_id, persona = %role, error = %e, "summary skipped");
                }
            }
        }
        debug!(
            summaries = summaries.len(),
            buffers = replay.buffers().len(),
            "summary fan-out settled"
        );

        let runs = replay
            .runs()
            .iter()
            .map(|run| FinishedRun {
                id: run.id.clone(),
                personas: run
                    .personas
                    .iter()
                    .map(|persona| FinishedPersona {
                        role: persona.id,
                        model: persona.model.clone(),
                        response: replay
                            .buffer(&run.id, persona.id)
                            .unwrap_or_default()
                            .to_string(),
                        summary: summaries.remove(&(run.id.clone(), persona.id)),
                    })
                    .collect(),
            })
            .collect();

        FinishedDebate {
            topic: topic.to_string(),
            is_multi_run: replay.is_multi_run(),
            runs,
            sources: replay.sources().to_vec(),
        }
    }
}

/// Persist an assembled debate. Failures are logged, never propagated:
/// losing history must not fail the session that produced it.
pub fn persist(repo: &DebateRepo, debate: &FinishedDebate) {
    let runs: Vec<RunRecord> = debate
        .runs
        .iter()
        .map(|run| RunRecord {
            id: run.id.clone(),
            minimizer: persona_record(run, PersonaRole::Minimizer),
            hawk: persona_record(run, PersonaRole::Hawk),
        })
        .collect();

    match repo.insert(
        &debate.topic,
        debate.is_multi_run,
        runs,
        debate.sources.clone(),
    ) {
        Ok(record) => debug!(debate_id = %record.id, "debate persisted"),
        Err(e) => warn!(error = %e, "failed to persist debate"),
    }
}

fn persona_record(run: &FinishedRun, role: PersonaRole) -> PersonaResponse {
    run.personas
        .iter()
        .find(|p| p.role == role)
        .map(|p| PersonaResponse {
            model: p.model.clone(),
            response: p.response.clone(),
            summary: p.summary.clone(),
        })
        .unwrap_or(PersonaResponse {
            model: String::new(),
            response: String::new(),
            summary: None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spar_core::events::{DebateEvent, PersonaInit, RunInit};
    use spar_store::Database;

    /// Summarizer that fails for one configured persona.
    struct FlakySummarizer {
        fail_for: Option<PersonaRole>,
    }

    #[async_trait]
    impl Summarizer for FlakySummarizer {
        async fn summarize(
            &self,
            content: &str,
            persona_id: PersonaRole,
        ) -> Result<String, SummaryError> {
            if self.fail_for == Some(persona_id) {
                return Err(SummaryError::Status {
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok(format!("summary of {} chars", content.len()))
        }
    }

    fn replay_with_buffers() -> DebateReplay {
        let mut replay = DebateReplay::new();
        replay
            .apply(DebateEvent::Init {
                is_multi_run: false,
                runs: vec![RunInit {
                    id: RunId::single(),
                    personas: vec![
                        PersonaInit {
                            id: PersonaRole::Minimizer,
                            name: "The Minimizer".into(),
                            color: "#10b981".into(),
                            model: "gpt-5.1-2025-11-13".into(),
                        },
                        PersonaInit {
                            id: PersonaRole::Hawk,
                            name: "The Compliance Hawk".into(),
                            color: "#ef4444".into(),
                            model: "gpt-5.1-2025-11-13".into(),
                        },
                    ],
                }],
            })
            .unwrap();
        for (role, text) in [
            (PersonaRole::Minimizer, "deduct everything"),
            (PersonaRole::Hawk, "deduct nothing"),
        ] {
            replay
                .apply(DebateEvent::Delta {
                    run_id: RunId::single(),
                    persona_id: role,
                    persona_name: "n".into(),
                    color: "#fff".into(),
                    delta: text.into(),
                })
                .unwrap();
        }
        replay.apply(DebateEvent::Done).unwrap();
        replay
    }

    #[tokio::test]
    async fn all_buffers_summarized() {
        let replay = replay_with_buffers();
        let summarizer = FlakySummarizer { fail_for: None };
        let debate = SummaryFanout::new(&summarizer)
            .run(&replay, "Section 14Q deduction")
            .await;

        assert_eq!(debate.topic, "Section 14Q deduction");
        assert_eq!(debate.runs.len(), 1);
        let personas = &debate.runs[0].personas;
        assert!(personas.iter().all(|p| p.summary.is_some()));
        assert_eq!(personas[0].response, "deduct everything");
    }

    #[tokio::test]
    async fn failed_summary_omitted_others_kept() {
        let replay = replay_with_buffers();
        let summarizer = FlakySummarizer {
            fail_for: Some(PersonaRole::Hawk),
        };
        let debate = SummaryFanout::new(&summarizer).run(&replay, "GST").await;

        let personas = &debate.runs[0].personas;
        let minimizer = personas.iter().find(|p| p.role == PersonaRole::Minimizer).unwrap();
        let hawk = personas.iter().find(|p| p.role == PersonaRole::Hawk).unwrap();
        assert!(minimizer.summary.is_some());
        assert!(hawk.summary.is_none());
        // The failed summary never erases the response text.
        assert_eq!(hawk.response, "deduct nothing");
    }

    #[tokio::test]
    async fn empty_buffer_not_summarized() {
        let mut replay = DebateReplay::new();
        replay
            .apply(DebateEvent::Init {
                is_multi_run: false,
                runs: vec![RunInit {
                    id: RunId::single(),
                    personas: vec![PersonaInit {
                        id: PersonaRole::Minimizer,
                        name: "The Minimizer".into(),
                        color: "#10b981".into(),
                        model: "m".into(),
                    }],
                }],
            })
            .unwrap();
        replay.apply(DebateEvent::Done).unwrap();

        let summarizer = FlakySummarizer { fail_for: None };
        let debate = SummaryFanout::new(&summarizer).run(&replay, "GST").await;
        assert!(debate.runs[0].personas[0].summary.is_none());
        assert_eq!(debate.runs[0].personas[0].response, "");
    }

    #[tokio::test]
    async fn assembled_debate_persists() {
        let replay = replay_with_buffers();
        let summarizer = FlakySummarizer { fail_for: None };
        let debate = SummaryFanout::new(&summarizer).run(&replay, "GST").await;

        let repo = DebateRepo::new(Database::in_memory().unwrap());
        persist(&repo, &debate);

        let stored = repo.list(10, 0).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].topic, "GST");
        assert_eq!(stored[0].runs[0].minimizer.response, "deduct everything");
        assert!(stored[0].runs[0].hawk.summary.is_some());
    }
}
