pub mod multiplexer;
pub mod planner;
pub mod prompt;

pub use multiplexer::{GenerationMultiplexer, MultiplexError};
pub use planner::{plan, DebatePlan, PlanError, RunDescriptor};
pub use prompt::generation_request;
