//! Shared data model for the repair-governor policy engine.
//!
//! This crate owns no behavior beyond small pure helpers — it is the wire
//! format and constant table that `governor-policy`, `governor-prompts`, and
//! `governor-context` all build on. Nothing here executes a tool, talks to an
//! LLM, or touches the filesystem beyond config loading.

mod config;
mod constants;
mod error;
mod event;
mod llm;
mod phase;
mod reasoning;
mod repository;
mod tool;
mod transcript;

pub use config::{BudgetConfig, GovernorConfig, PathMappingConfig};
pub use constants::*;
pub use error::GovernorError;
pub use event::{EventEnvelope, EventKind};
pub use llm::{LlmClient, LlmResponse};
pub use phase::Phase;
pub use reasoning::{ReasoningConfig, ReasoningEffort};
pub use repository::{ProjectType, RepositoryConfig};
pub use tool::{ToolCall, ToolHost, ToolName, ToolResult, normalize_tool_name};
pub use transcript::{ContentBlock, MessageContent, Role, TranscriptMessage, estimate_tokens};

pub type Result<T> = anyhow::Result<T>;
