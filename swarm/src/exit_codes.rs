//! Stable exit codes for swarm CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid config, arguments or other errors.
pub const INVALID: i32 = 1;
/// A file operation returned a failure result (not found, invalid target, I/O).
pub const OPERATION_FAILED: i32 = 2;
/// The path resolved outside the sandbox root.
pub const SECURITY_VIOLATION: i32 = 3;
