//! Core library for the prompt assistant chat client.
//!
//! This crate implements:
//! - A streaming tag parser that turns LLM output containing inline control
//!   tags (`<thought>`, `<tool_call>`, `<tool_pending>`, `<tool_result>`,
//!   `<answer>`) into an ordered list of typed segments
//! - An approval tracker for tool actions that require human confirmation
//! - A provider abstraction for streaming chat completions (Ollama)
//! - Session state for one conversation: ordered messages, turn driving,
//!   cancellation

pub mod approval;
pub mod config;
pub mod llm;
pub mod prompts;
pub mod session;
pub mod streaming;
