//! Deterministic, pure logic shared by the file store.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod encoding;
pub mod path;
pub mod pylint;
pub mod types;
