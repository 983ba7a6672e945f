//! Tree-of-thought reasoning loop over a chat-completion backend.
//!
//! For a problem statement the loop asks a language model for `k` candidate
//! next steps, scores each one with a second prompt, and either regenerates the
//! batch or selects the best-scoring thought. The crate keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (quality gate, selection, state
//!   updates, JSON payload recovery). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (HTTP backend, config, prompt
//!   rendering, transcript files).
//! - **[`agents`]**: The generator and evaluator, which turn backend failures
//!   into data.
//!
//! [`looping`] drives the agents through the generate → evaluate → decide →
//! select cycle.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
