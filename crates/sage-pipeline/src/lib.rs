pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod sources;
pub mod weights;

pub mod test_support;

pub use error::PipelineError;
pub use llm::{LlmClient, LlmReply, OpenAiClient};
pub use orchestrator::Orchestrator;
pub use parser::{parse, ParsedGrade};
pub use sources::{SourceDataProvider, StaticPayloads};
