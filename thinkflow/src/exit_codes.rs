//! Stable exit codes for thinkflow CLI commands.

/// Command succeeded; for `thinkflow run` a thought was selected.
pub const OK: i32 = 0;
/// Command failed due to invalid input/config or other errors.
pub const INVALID: i32 = 1;
/// `thinkflow run` finished without any candidate thought to select.
pub const NO_RESULT: i32 = 2;
