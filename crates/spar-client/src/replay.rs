use std::collections::BTreeMap;

use spar_core::events::{DebateEvent, RunInit, SourceDoc};
use spar_core::ids::RunId;
use spar_core::persona::PersonaRole;
use spar_core::wire::{FrameDecoder, WireError};

/// Where the replay currently stands in the session lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayState {
    Idle,
    Searching,
    Initialized,
    Streaming,
    Completed,
    /// Transport closed before `Done`. Partial buffers are retained.
    Errored,
}

/// A scoped task failure reported by the server mid-session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskFailure {
    pub run_id: Option<RunId>,
    pub persona_id: Option<PersonaRole>,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ReplayError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("delta for unknown stream {run_id}/{persona_id}")]
    UnknownStream {
        run_id: RunId,
        persona_id: PersonaRole,
    },
    #[error("duplicate init frame")]
    DuplicateInit,
    #[error("event after done")]
    EventAfterDone,
    #[error("{event_type} frame out of order in state {state:?}")]
    OutOfOrder {
        event_type: &'static str,
        state: ReplayState,
    },
}

/// Rebuilds per-(run, persona) response buffers from the framed byte
/// stream. Chunk boundaries are arbitrary: reassembly is delegated to
/// `FrameDecoder`, which holds any trailing partial frame between feeds.
pub struct DebateReplay {
    decoder: FrameDecoder,
    state: ReplayState,
    is_multi_run: bool,
    runs: Vec<RunInit>,
    sources: Vec<SourceDoc>,
    buffers: BTreeMap<(RunId, PersonaRole), String>,
    failures: Vec<TaskFailure>,
}

impl Default for DebateReplay {
    fn default() -> Self {
        Self::new()
    }
}

impl DebateReplay {
    pub fn new() -> Self {
        Self {
            decoder: FrameDecoder::new(),
            state: ReplayState::Idle,
            is_multi_run: false,
            runs: Vec::new(),
            sources: Vec::new(),
            buffers: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    /// Feed one transport chunk, applying every complete frame it finishes.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), ReplayError> {
        for event in self.decoder.push(chunk)? {
            self.apply(event)?;
        }
        Ok(())
    }

    /// Apply one decoded event to the state machine.
    pub fn apply(&mut self, event: DebateEvent) -> Result<(), ReplayError> {
        if self.state == ReplayState::Completed {
            return Err(ReplayError::EventAfterDone);
        }

        match event {
            DebateEvent::Searching => match self.state {
                ReplayState::Idle => {
                    self.state = ReplayState::Searching;
                    Ok(())
                }
                state => Err(ReplayError::OutOfOrder {
                    event_type: "searching",
                    state,
                }),
            },
            DebateEvent::Sources { sources } => match self.state {
                ReplayState::Idle | ReplayState::Searching => {
                    self.sources = sources;
                    Ok(())
                }
                state => Err(ReplayError::OutOfOrder {
                    event_type: "sources",
                    state,
                }),
            },
            DebateEvent::Init { is_multi_run, runs } => {
                if !matches!(self.state, ReplayState::Idle | ReplayState::Searching) {
                    return Err(ReplayError::DuplicateInit);
                }
                for run in &runs {
                    for persona in &run.personas {
                        self.buffers
                            .insert((run.id.clone(), persona.id), String::new());
                    }
                }
                self.is_multi_run = is_multi_run;
                self.runs = runs;
                self.state = ReplayState::Initialized;
                Ok(())
            }
            DebateEvent::Delta {
                run_id,
                persona_id,
                delta,
                ..
            } => {
                let Some(buffer) = self.buffers.get_mut(&(run_id.clone(), persona_id)) else {
                    return Err(ReplayError::UnknownStream { run_id, persona_id });
                };
                buffer.push_str(&delta);
                self.state = ReplayState::Streaming;
                Ok(())
            }
            DebateEvent::Error {
                run_id,
                persona_id,
                message,
            } => {
                self.failures.push(TaskFailure {
                    run_id,
                    persona_id,
                    message,
                });
                Ok(())
            }
            DebateEvent::Done => {
                self.state = ReplayState::Completed;
                Ok(())
            }
        }
    }

    /// The transport ended. Without a prior `Done` the session is errored;
    /// buffers accumulated so far stay readable.
    pub fn on_transport_closed(&mut self) {
        if self.state != ReplayState::Completed {
            self.state = ReplayState::Errored;
        }
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == ReplayState::Completed
    }

    pub fn is_multi_run(&self) -> bool {
        self.is_multi_run
    }

    pub fn runs(&self) -> &[RunInit] {
        &self.runs
    }

    pub fn sources(&self) -> &[SourceDoc] {
        &self.sources
    }

    pub fn buffers(&self) -> &BTreeMap<(RunId, PersonaRole), String> {
        &self.buffers
    }

    pub fn buffer(&self, run_id: &RunId, persona_id: PersonaRole) -> Option<&str> {
        self.buffers
            .get(&(run_id.clone(), persona_id))
            .map(String::as_str)
    }

    pub fn failures(&self) -> &[TaskFailure] {
        &self.failures
    }
}
