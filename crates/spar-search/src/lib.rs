pub mod context;
pub mod exa;
pub mod provider;

pub use context::build_context;
pub use exa::ExaSearchProvider;
pub use provider::{SearchConfig, SearchOutcome, SearchProvider, StaticSearchProvider};
