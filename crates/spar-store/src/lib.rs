pub mod database;
pub mod debates;
pub mod error;
pub mod schema;

pub use database::Database;
pub use debates::{DebateRecord, DebateRepo, PersonaResponse, RunRecord};
pub use error::StoreError;
