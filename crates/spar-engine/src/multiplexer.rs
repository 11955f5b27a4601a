use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use spar_core::errors::ProviderError;
use spar_core::events::DebateEvent;
use spar_core::ids::RunId;
use spar_core::persona::{PersonaBinding, PersonaRole};
use spar_llm::provider::GenerationProvider;

use crate::planner::DebatePlan;
use crate::prompt;

const TASK_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum MultiplexError {
    /// The event sink went away mid-session (client disconnect).
    #[error("event sink closed")]
    SinkClosed,
    /// The session was cancelled before all tasks settled.
    #[error("session cancelled")]
    Cancelled,
}

/// What one generation task reports back to the driver.
enum TaskMessage {
    Fragment {
        run_id: RunId,
        role: PersonaRole,
        name: String,
        color: String,
        text: String,
    },
    Failed {
        run_id: RunId,
        role: PersonaRole,
        error: ProviderError,
    },
    Finished {
        run_id: RunId,
        role: PersonaRole,
    },
}

/// Runs every (run, persona) generation task concurrently and serializes
/// their output into one ordered event sequence.
///
/// The driver is the sole writer to the sink: tasks report fragments over
/// an internal channel and the driver translates them into `Delta` frames.
/// A task failure becomes one scoped `Error` frame and never touches the
/// other tasks. Exactly one `Init` opens the sequence and exactly one
/// `Done` closes it, after every task has settled.
pub struct GenerationMultiplexer {
    provider: Arc<dyn GenerationProvider>,
}

impl GenerationMultiplexer {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider }
    }

    #[instrument(skip(self, plan, context, events, cancel), fields(runs = plan.runs.len()))]
    pub async fn drive(
        &self,
        plan: &DebatePlan,
        topic: &str,
        context: &str,
        events: &mpsc::Sender<DebateEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), MultiplexError> {
        let init = DebateEvent::Init {
            is_multi_run: plan.is_multi_run,
            runs: plan.runs.iter().map(|run| run.init_frame()).collect(),
        };
        events
            .send(init)
            .await
            .map_err(|_| MultiplexError::SinkClosed)?;

        let (tx, mut rx) = mpsc::channel::<TaskMessage>(TASK_CHANNEL_CAPACITY);
        let mut remaining = 0usize;
        for run in &plan.runs {
            for binding in run.bindings() {
                remaining += 1;
                let request = prompt::generation_request(binding, topic, context);
                let provider = Arc::clone(&self.provider);
                let tx = tx.clone();
                let cancel = cancel.clone();
                let run_id = run.id.clone();
                let binding = binding.clone();
                tokio::spawn(stream_task(provider, request, run_id, binding, tx, cancel));
            }
        }
        drop(tx);

        while remaining > 0 {
            let Some(message) = rx.recv().await else {
                // Every task sender dropped without settling: cancellation.
                return Err(MultiplexError::Cancelled);
            };
            match message {
                TaskMessage::Fragment {
                    run_id,
                    role,
                    name,
                    color,
                    text,
                } => {
                    let delta = DebateEvent::Delta {
                        run_id,
                        persona_id: role,
                        persona_name: name,
                        color,
                        delta: text,
                    };
                    if events.send(delta).await.is_err() {
                        cancel.cancel();
                        return Err(MultiplexError::SinkClosed);
                    }
                }
                TaskMessage::Failed {
                    run_id,
                    role,
                    error,
                } => {
                    warn!(
                        run_id = %run_id,
                        persona = %role,
                        kind = error.kind(),
                        "generation task failed"
                    );
                    remaining -= 1;
                    let frame = DebateEvent::Error {
                        run_id: Some(run_id),
                        persona_id: Some(role),
                        message: error.to_string(),
                    };
                    if events.send(frame).await.is_err() {
                        cancel.cancel();
                        return Err(MultiplexError::SinkClosed);
                    }
                }
                TaskMessage::Finished { run_id, role } => {
                    debug!(run_id = %run_id, persona = %role, "generation task finished");
                    remaining -= 1;
                }
            }
        }

        events
            .send(DebateEvent::Done)
            .await
            .map_err(|_| MultiplexError::SinkClosed)
    }
}

async fn stream_task(
    provider: Arc<dyn GenerationProvider>,
    request: spar_llm::provider::GenerationRequest,
    run_id: RunId,
    binding: PersonaBinding,
    tx: mpsc::Sender<TaskMessage>,
    cancel: CancellationToken,
) {
    let started = tokio::select! {
        _ = cancel.cancelled() => return,
        result = provider.stream(&request) => result,
    };
    let mut stream = match started {
        Ok(stream) => stream,
        Err(error) => {
            let _ = tx
                .send(TaskMessage::Failed {
                    run_id,
                    role: binding.role,
                    error,
                })
                .await;
            return;
        }
    };

    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => return,
            item = stream.next() => item,
        };
        match item {
            Some(Ok(text)) => {
                let message = TaskMessage::Fragment {
                    run_id: run_id.clone(),
                    role: binding.role,
                    name: binding.name.clone(),
                    color: binding.color.clone(),
                    text,
                };
                if tx.send(message).await.is_err() {
                    return;
                }
            }
            Some(Err(error)) => {
                let _ = tx
                    .send(TaskMessage::Failed {
                        run_id,
                        role: binding.role,
                        error,
                    })
                    .await;
                return;
            }
            None => {
                let _ = tx
                    .send(TaskMessage::Finished {
                        run_id,
                        role: binding.role,
                    })
                    .await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use spar_core::request::{DebateRequest, RunConfig};
    use spar_llm::mock::{MockProvider, MockResponse};
    use spar_llm::provider::{CompletionRequest, FragmentStream, GenerationRequest};

    use crate::planner::plan;

    /// Routes each stream() call to a canned response by model name, so
    /// concurrent tasks get deterministic payloads regardless of spawn
    /// interleaving.
    struct RoutedProvider {
        by_model: HashMap<String, MockResponse>,
    }

    impl RoutedProvider {
        fn new(routes: Vec<(&str, MockResponse)>) -> Self {
            Self {
                by_model: routes
                    .into_iter()
                    .map(|(model, response)| (model.to_string(), response))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for RoutedProvider {
        fn name(&self) -> &str {
            "routed"
        }

        async fn stream(
            &self,
            request: &GenerationRequest,
        ) -> Result<FragmentStream, ProviderError> {
            match self.by_model.get(&request.model) {
                Some(MockResponse::Stream(items)) => {
                    Ok(Box::pin(futures::stream::iter(items.clone())))
                }
                Some(MockResponse::Error(e)) => Err(e.clone()),
                Some(MockResponse::Delay(..)) | None => Err(ProviderError::InvalidRequest(
                    format!("no route for model {}", request.model),
                )),
            }
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
            Err(ProviderError::InvalidRequest("not routed".into()))
        }
    }

    fn single_request(topic: &str) -> DebateRequest {
        DebateRequest {
            topic: topic.into(),
            ..DebateRequest::default()
        }
    }

    fn multi_request(configs: Vec<(&str, &str, &str)>) -> DebateRequest {
        DebateRequest {
            topic: "transfer pricing".into(),
            run_configs: Some(
                configs
                    .into_iter()
                    .map(|(id, m, h)| RunConfig {
                        id: id.into(),
                        minimizer_model: m.into(),
                        hawk_model: h.into(),
                    })
                    .collect(),
            ),
            ..DebateRequest::default()
        }
    }

    async fn collect_events(
        provider: Arc<dyn GenerationProvider>,
        request: &DebateRequest,
        context: &str,
    ) -> (Vec<DebateEvent>, Result<(), MultiplexError>) {
        let plan = plan(request).unwrap();
        let mux = GenerationMultiplexer::new(provider);
        let (tx, mut rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();
        let result = mux.drive(&plan, &request.topic, context, &tx, &cancel).await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (events, result)
    }

    /// Concatenated deltas grouped by (run, persona).
    fn buffers(events: &[DebateEvent]) -> HashMap<(RunId, PersonaRole), String> {
        let mut map: HashMap<(RunId, PersonaRole), String> = HashMap::new();
        for event in events {
            if let DebateEvent::Delta {
                run_id,
                persona_id,
                delta,
                ..
            } = event
            {
                map.entry((run_id.clone(), *persona_id))
                    .or_default()
                    .push_str(delta);
            }
        }
        map
    }

    #[tokio::test]
    async fn init_first_done_last_nothing_after() {
        let provider = Arc::new(MockProvider::new(vec![
            MockResponse::fragments(["a", "b"]),
            MockResponse::fragments(["c"]),
        ]));
        let (events, result) = collect_events(provider, &single_request("GST"), "").await;

        result.unwrap();
        assert!(matches!(events.first(), Some(DebateEvent::Init { .. })));
        assert!(matches!(events.last(), Some(DebateEvent::Done)));
        let done_count = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(done_count, 1);
    }

    #[tokio::test]
    async fn single_run_produces_both_persona_streams() {
        let provider = Arc::new(RoutedProvider::new(vec![
            ("min-model", MockResponse::fragments(["tax ", "haven"])),
            ("hawk-model", MockResponse::fragments(["audit ", "risk"])),
        ]));
        let request = DebateRequest {
            topic: "GST".into(),
            minimizer_model: Some("min-model".into()),
            hawk_model: Some("hawk-model".into()),
            ..DebateRequest::default()
        };
        let (events, result) = collect_events(provider, &request, "").await;

        result.unwrap();
        let buffers = buffers(&events);
        assert_eq!(buffers.len(), 2);
        assert_eq!(
            buffers[&(RunId::single(), PersonaRole::Minimizer)],
            "tax haven"
        );
        assert_eq!(buffers[&(RunId::single(), PersonaRole::Hawk)], "audit risk");
    }

    #[tokio::test]
    async fn multi_run_spawns_two_streams_per_config() {
        let provider = Arc::new(RoutedProvider::new(vec![
            ("m1", MockResponse::fragments(["r1", "-min"])),
            ("h1", MockResponse::fragments(["r1", "-hawk"])),
            ("m2", MockResponse::fragments(["r2", "-min"])),
            ("h2", MockResponse::fragments(["r2", "-hawk"])),
        ]));
        let request = multi_request(vec![("run-1", "m1", "h1"), ("run-2", "m2", "h2")]);
        let (events, result) = collect_events(provider, &request, "").await;

        result.unwrap();
        let buffers = buffers(&events);
        assert_eq!(buffers.len(), 4);
        assert_eq!(
            buffers[&(RunId::from_raw("run-1"), PersonaRole::Minimizer)],
            "r1-min"
        );
        assert_eq!(
            buffers[&(RunId::from_raw("run-2"), PersonaRole::Hawk)],
            "r2-hawk"
        );
        // Init advertises both runs before any delta.
        match &events[0] {
            DebateEvent::Init { is_multi_run, runs } => {
                assert!(*is_multi_run);
                assert_eq!(runs.len(), 2);
            }
            other => panic!("expected init first, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn per_stream_fragment_order_preserved() {
        let parts: Vec<String> = (0..20).map(|i| format!("{i};")).collect();
        let provider = Arc::new(RoutedProvider::new(vec![
            (
                "min-model",
                MockResponse::fragments(parts.iter().map(String::as_str)),
            ),
            ("hawk-model", MockResponse::fragments(["x"])),
        ]));
        let request = DebateRequest {
            topic: "GST".into(),
            minimizer_model: Some("min-model".into()),
            hawk_model: Some("hawk-model".into()),
            ..DebateRequest::default()
        };
        let (events, _) = collect_events(provider, &request, "").await;

        let buffers = buffers(&events);
        assert_eq!(
            buffers[&(RunId::single(), PersonaRole::Minimizer)],
            parts.concat()
        );
    }

    #[tokio::test]
    async fn one_failing_task_leaves_others_intact() {
        let provider = Arc::new(RoutedProvider::new(vec![
            ("m1", MockResponse::fragments(["ok-1"])),
            (
                "h1",
                MockResponse::Error(ProviderError::RateLimited { retry_after: None }),
            ),
            ("m2", MockResponse::fragments(["ok-2"])),
            ("h2", MockResponse::fragments(["ok-3"])),
        ]));
        let request = multi_request(vec![("run-1", "m1", "h1"), ("run-2", "m2", "h2")]);
        let (events, result) = collect_events(provider, &request, "").await;

        result.unwrap();
        // Exactly one scoped error, for the failed (run, persona) pair.
        let errors: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                DebateEvent::Error {
                    run_id, persona_id, ..
                } => Some((run_id.clone(), *persona_id)),
                _ => None,
            })
            .collect();
        assert_eq!(
            errors,
            vec![(Some(RunId::from_raw("run-1")), Some(PersonaRole::Hawk))]
        );
        // The other three streams complete and the session still closes.
        assert_eq!(buffers(&events).len(), 3);
        assert!(matches!(events.last(), Some(DebateEvent::Done)));
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_earlier_fragments() {
        let provider = Arc::new(RoutedProvider::new(vec![
            (
                "min-model",
                MockResponse::fragments_then_error(
                    ["partial "],
                    ProviderError::StreamInterrupted("cut".into()),
                ),
            ),
            ("hawk-model", MockResponse::fragments(["whole"])),
        ]));
        let request = DebateRequest {
            topic: "GST".into(),
            minimizer_model: Some("min-model".into()),
            hawk_model: Some("hawk-model".into()),
            ..DebateRequest::default()
        };
        let (events, result) = collect_events(provider, &request, "").await;

        result.unwrap();
        let buffers = buffers(&events);
        assert_eq!(buffers[&(RunId::single(), PersonaRole::Minimizer)], "partial ");
        assert_eq!(buffers[&(RunId::single(), PersonaRole::Hawk)], "whole");
        assert!(events.iter().any(|e| matches!(e, DebateEvent::Error { .. })));
        assert!(matches!(events.last(), Some(DebateEvent::Done)));
    }

    #[tokio::test]
    async fn sink_closed_cancels_session() {
        let provider = Arc::new(MockProvider::new(vec![
            MockResponse::fragments(["a", "b", "c"]),
            MockResponse::fragments(["d", "e", "f"]),
        ]));
        let plan = plan(&single_request("GST")).unwrap();
        let mux = GenerationMultiplexer::new(provider);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let cancel = CancellationToken::new();
        let result = mux.drive(&plan, "GST", "", &tx, &cancel).await;

        assert!(matches!(result, Err(MultiplexError::SinkClosed)));
    }

    #[tokio::test]
    async fn cancellation_stops_tasks() {
        let provider = Arc::new(MockProvider::new(vec![
            MockResponse::delayed(
                std::time::Duration::from_secs(3600),
                MockResponse::stream_text("never"),
            ),
            MockResponse::delayed(
                std::time::Duration::from_secs(3600),
                MockResponse::stream_text("never"),
            ),
        ]));
        let plan = plan(&single_request("GST")).unwrap();
        let mux = GenerationMultiplexer::new(provider);
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = mux.drive(&plan, "GST", "", &tx, &cancel).await;

        assert!(matches!(result, Err(MultiplexError::Cancelled)));
        drop(tx);
        // Init was sent before cancellation took effect, nothing after it.
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], DebateEvent::Init { .. }));
    }
}
