//! Result contract shared by every file-store operation.
//!
//! An [`OperationResult`] is a caller-owned value. Failures that callers are
//! expected to handle (escapes, missing files, OS errors) are carried inside it
//! rather than surfaced as `Err`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::encoding::Encoding;

/// Classification of a failed file operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Path resolved outside the sandbox root.
    SecurityError,
    /// Target does not exist.
    NotFound,
    /// Target exists but is not a regular file.
    InvalidTarget,
    /// Any other OS-level failure.
    #[serde(rename = "IOError")]
    IoError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Per-operation details. Only fields relevant to the operation are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_written: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Encoding>,
    /// Set on reads that had to fall back to Latin-1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_fallback: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_count: Option<usize>,
    /// ISO-8601 modification time of the file that was read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    /// ISO-8601 time a backup was taken.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_created: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
}

/// Outcome of a single file operation.
///
/// Fields are private so the constructors can uphold the invariants:
/// a success never carries an error and a failure never carries content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    success: bool,
    content: Option<String>,
    filepath: PathBuf,
    error: Option<OperationError>,
    metadata: Metadata,
}

impl OperationResult {
    pub fn success(filepath: PathBuf, content: Option<String>, metadata: Metadata) -> Self {
        Self {
            success: true,
            content,
            filepath,
            error: None,
            metadata,
        }
    }

    pub fn failure(filepath: PathBuf, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            filepath,
            error: Some(OperationError {
                kind,
                message: message.into(),
            }),
            metadata: Metadata::default(),
        }
    }

    /// Attach metadata to a result (used by failed writes that already took a backup).
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn into_content(self) -> Option<String> {
        self.content
    }

    /// Resolved path when validation succeeded, otherwise the path as requested.
    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    pub fn error(&self) -> Option<&OperationError> {
        self.error.as_ref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|err| err.kind)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Loggable view of the result; content is reduced to `has_content`.
    pub fn summary(&self) -> OperationSummary<'_> {
        OperationSummary {
            success: self.success,
            filepath: self.filepath.display().to_string(),
            error: self.error.as_ref(),
            metadata: &self.metadata,
            has_content: self.content.is_some(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OperationSummary<'a> {
    pub success: bool,
    pub filepath: String,
    pub error: Option<&'a OperationError>,
    pub metadata: &'a Metadata,
    pub has_content: bool,
}
