//! I/O helpers: the sandbox gate, file operations and collaborator plumbing.

pub mod analyzer;
pub mod backup;
pub mod config;
pub mod file_store;
pub mod process;
pub mod sandbox;
