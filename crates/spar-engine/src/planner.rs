use spar_core::events::{PersonaInit, RunInit};
use spar_core::ids::RunId;
use spar_core::persona::{PersonaBinding, HAWK, MINIMIZER};
use spar_core::request::DebateRequest;

/// One run resolved to concrete persona/model pairings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunDescriptor {
    pub id: RunId,
    pub minimizer: PersonaBinding,
    pub hawk: PersonaBinding,
}

impl RunDescriptor {
    pub fn bindings(&self) -> [&PersonaBinding; 2] {
        [&self.minimizer, &self.hawk]
    }

    pub fn init_frame(&self) -> RunInit {
        RunInit {
            id: self.id.clone(),
            personas: vec![
                PersonaInit::from(&self.minimizer),
                PersonaInit::from(&self.hawk),
            ],
        }
    }
}

/// The resolved shape of a debate session before any task starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebatePlan {
    pub is_multi_run: bool,
    pub runs: Vec<RunDescriptor>,
}

impl DebatePlan {
    /// Total number of generation tasks this plan will spawn.
    pub fn task_count(&self) -> usize {
        self.runs.len() * 2
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("Topic is required")]
    MissingTopic,
}

/// Resolve a request into the runs to execute. Best-of-N mode is active
/// when the request carries a non-empty `runConfigs` array; otherwise a
/// single run under the sentinel id.
pub fn plan(request: &DebateRequest) -> Result<DebatePlan, PlanError> {
    if request.topic.trim().is_empty() {
        return Err(PlanError::MissingTopic);
    }

    if request.is_multi_run() {
        let configs = request.run_configs.as_deref().unwrap_or_default();
        let runs = configs
            .iter()
            .map(|config| RunDescriptor {
                id: RunId::from_raw(&config.id),
                minimizer: MINIMIZER.bind(Some(&config.minimizer_model)),
                hawk: HAWK.bind(Some(&config.hawk_model)),
            })
            .collect();
        return Ok(DebatePlan {
            is_multi_run: true,
            runs,
        });
    }

    Ok(DebatePlan {
        is_multi_run: false,
        runs: vec![RunDescriptor {
            id: RunId::single(),
            minimizer: MINIMIZER.bind(request.minimizer_model.as_deref()),
            hawk: HAWK.bind(request.hawk_model.as_deref()),
        }],
    })
}
