pub mod mock;
pub mod openai;
pub mod provider;
pub mod sse;

pub use mock::{MockProvider, MockResponse};
pub use openai::OpenAiProvider;
pub use provider::{CompletionRequest, FragmentStream, GenerationProvider, GenerationRequest};
