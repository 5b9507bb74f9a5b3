//! Agent runtime - the reasoning loop that negotiates bookings
//!
//! This crate drives one conversational turn between a customer and a
//! venue's agent:
//! 1. **Conversation management** (`conversation`) - resume or create the
//!    negotiation session, attach an authenticated customer once
//! 2. **Model round-trips** (`llm`) - send the transcript plus tool
//!    declarations to the reasoning model
//! 3. **Tool execution** (`tools`, `executor`) - run the closed set of
//!    capabilities the model may request, strictly in request order
//! 4. **Turn assembly** (`runtime`) - append results, repeat until the
//!    model produces a customer-facing message
//!
//! # Safety principle
//!
//! The model is a negotiator, not a decision maker. Nothing it can invoke
//! mutates a booking directly: `propose_booking` and `escalate_to_owner`
//! only create pending records that a human resolves through the approval
//! workflow.

pub mod conversation;
pub mod executor;
pub mod llm;
pub mod runtime;
pub mod tools;

pub use conversation::ConversationManager;
pub use executor::{ToolContext, ToolExecutor, ToolOutcome};
pub use llm::{
    AnthropicClient, ChatMessage, ContentBlock, LlmClient, LlmError, ModelReply,
    ScriptedLlmClient, ToolDefinition,
};
pub use runtime::{AgentError, AgentRuntime, TurnOutcome, TurnRequest};
pub use tools::{tool_declarations, ToolCall, ToolParseError};
