//! Study logic and the assistant pipeline for StudyCards.
//!
//! `study` and `auth` sit directly on top of storage. The assistant wires
//! prompt building, the OpenAI client and reply parsing into `ask` and
//! `suggest`.

pub mod assistant;
pub mod auth;
pub mod llm;
pub mod prompt;
pub mod reply;
pub mod study;

pub use assistant::{
    Assistant, AssistantContext, AssistantProgress, AssistantRequest, AssistantResponse,
    ContextRef, SilentProgress,
};
pub use auth::{LoginResponse, login, register};
pub use llm::{ChatMessage, LlmClient};
pub use reply::{ParsedReply, parse_reply, parse_suggestions};
