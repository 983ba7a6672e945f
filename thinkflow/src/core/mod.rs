//! Deterministic, pure logic shared by the thought loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod gate;
pub mod payload;
pub mod selector;
pub mod state;
pub mod types;
