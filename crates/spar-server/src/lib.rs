pub mod channel;
pub mod handlers;
pub mod server;

pub use channel::{ChannelError, EventChannel};
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
