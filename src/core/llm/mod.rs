pub mod base;
pub mod openai;

pub use base::{GenerationError, GenerationRequest, GenerationResult, ResponseGenerator};
pub use openai::ChatCompletionsClient;
