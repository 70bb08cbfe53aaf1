//! Sandboxed file operations for the refactoring swarm agents.
//!
//! Agents that audit and fix code never touch the filesystem directly. They go
//! through a [`FileStore`](io::file_store::FileStore), which confines every
//! read, write and backup to one sandbox root and never leaves a file
//! half-written. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (result contract, encodings,
//!   backup naming, analyzer report parsing). No I/O.
//! - **[`io`]**: Side-effecting operations (path resolution, file operations,
//!   config, analyzer processes).
//!
//! [`audit`] coordinates the file store with an analyzer to implement the
//! `swarm audit` command.

pub mod audit;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
