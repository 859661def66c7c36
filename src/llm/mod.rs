mod metadata;
mod openai;

pub use metadata::{GeneratedMetadata, MetadataGenerator};
pub use openai::{ChatBackend, LlmClient, LlmConfig, LlmError, LlmMessage};
