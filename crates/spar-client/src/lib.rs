pub mod client;
pub mod replay;
pub mod summary;

pub use client::{ClientError, DebateClient};
pub use replay::{DebateReplay, ReplayError, ReplayState, TaskFailure};
pub use summary::{
    persist, FinishedDebate, FinishedPersona, FinishedRun, RemoteSummarizer, SummaryError,
    SummaryFanout, Summarizer,
};
