//! Brook, a streaming AI chat backend.
//!
//! A browser front-end submits prompts; this library forwards them to a
//! language-model provider, fans the incremental reply out to every
//! connected viewer of the conversation, and persists the history.

pub mod api;
pub mod chat;
pub mod db;
pub mod llm;
