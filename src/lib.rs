//! chatline: interactive LLM chat in the terminal
//!
//! The library holds the conversation core (history and reduction), the
//! completion backends, configuration, and the session that ties them
//! together. The binary in `main.rs` is a thin console loop over it.

pub mod cli;
pub mod config;
pub mod constants;
pub mod conversation;
pub mod llm;
pub mod session;
