pub mod errors;
pub mod events;
pub mod ids;
pub mod persona;
pub mod request;
pub mod wire;

pub use errors::ProviderError;
pub use events::{DebateEvent, PersonaInit, RunInit, SourceDoc};
pub use ids::{RunId, SessionId};
pub use persona::{PersonaBinding, PersonaRole, PersonaSpec};
pub use request::{DebateRequest, RunConfig, SearchMode, SearchType};
pub use wire::{encode_frame, FrameDecoder, WireError};
