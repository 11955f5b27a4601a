use serde::{Deserialize, Serialize};

use crate::ids::RunId;
use crate::persona::{PersonaBinding, PersonaRole};

/// One reference document returned by the search provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDoc {
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Per-run metadata carried in the `init` frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInit {
    pub id: RunId,
    pub personas: Vec<PersonaInit>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaInit {
    pub id: PersonaRole,
    pub name: String,
    pub color: String,
    pub model: String,
}

impl From<&PersonaBinding> for PersonaInit {
    fn from(b: &PersonaBinding) -> Self {
        Self {
            id: b.role,
            name: b.name.clone(),
            color: b.color.clone(),
            model: b.model.clone(),
        }
    }
}

/// Everything that crosses the session wire, exactly once, in order.
///
/// Ordering contract: `Searching`/`Sources` may only appear before `Init`;
/// exactly one `Init` precedes all `Delta`s; exactly one `Done` terminates
/// the session and nothing follows it. `Error` is scoped to one
/// (run, persona) task and does not terminate the session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DebateEvent {
    Searching,
    Sources {
        sources: Vec<SourceDoc>,
    },
    #[serde(rename_all = "camelCase")]
    Init {
        is_multi_run: bool,
        runs: Vec<RunInit>,
    },
    #[serde(rename_all = "camelCase")]
    Delta {
        run_id: RunId,
        persona_id: PersonaRole,
        persona_name: String,
        color: String,
        delta: String,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        run_id: Option<RunId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        persona_id: Option<PersonaRole>,
        message: String,
    },
    Done,
}

impl DebateEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Searching => "searching",
            Self::Sources { .. } => "sources",
            Self::Init { .. } => "init",
            Self::Delta { .. } => "delta",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }
}
