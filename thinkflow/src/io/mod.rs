//! I/O helpers: backend calls, configuration, prompts, and transcripts.

pub mod backend;
pub mod config;
pub mod prompt;
pub mod transcript;
