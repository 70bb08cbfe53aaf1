//! Orchestration for auditing a code snippet.
//!
//! An audit stages the code as a file inside the sandbox (through the file
//! store, so it is validated and written atomically), hands the validated path
//! to an [`Analyzer`], and removes the staged file afterwards through the
//! store as well.

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Result, anyhow};
use tracing::{debug, warn};

use crate::io::analyzer::{AnalysisReport, Analyzer};
use crate::io::file_store::{FileStore, WriteOptions};

static STAGED_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique, hidden name for a staged audit input.
fn staged_name() -> PathBuf {
    let n = STAGED_COUNTER.fetch_add(1, Ordering::Relaxed);
    PathBuf::from(format!(".audit-{}-{n}.py", process::id()))
}

/// Analyze `code` by staging it in the sandbox root.
pub fn audit_code<A: Analyzer>(store: &FileStore, analyzer: &A, code: &str) -> Result<AnalysisReport> {
    let options = WriteOptions {
        create_backup: false,
        ..WriteOptions::default()
    };
    let staged = store.write_file(staged_name(), code, options);
    if !staged.is_success() {
        let message = staged
            .error()
            .map_or_else(|| "unknown error".to_string(), |err| err.message.clone());
        return Err(anyhow!("stage audit input: {message}"));
    }
    let path = staged.filepath().to_path_buf();
    debug!(path = %path.display(), "audit input staged");

    let report = analyzer.analyze(&path);

    let removed = store.remove_file(&path);
    if let Some(err) = removed.error() {
        warn!(path = %path.display(), err = %err.message, "failed to remove staged audit input");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedAnalyzer, TestSandbox};

    #[test]
    fn audit_stages_code_then_cleans_up() {
        let sandbox = TestSandbox::new().expect("sandbox");
        let analyzer = ScriptedAnalyzer::passing(9.5);

        let report = audit_code(sandbox.store(), &analyzer, "x = 1\n").expect("audit");
        assert_eq!(report.score, Some(9.5));

        let seen = analyzer.seen();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].path.starts_with(sandbox.root()));
        assert_eq!(seen[0].content.as_deref(), Some("x = 1\n"));
        assert!(!seen[0].path.exists());
    }

    #[test]
    fn staged_names_are_unique() {
        assert_ne!(staged_name(), staged_name());
    }

    #[test]
    fn analyzer_error_still_removes_staged_file() {
        let sandbox = TestSandbox::new().expect("sandbox");
        let analyzer = ScriptedAnalyzer::erroring("linter crashed");

        let err = audit_code(sandbox.store(), &analyzer, "x = 1\n").unwrap_err();
        assert!(err.to_string().contains("linter crashed"));
        let seen = analyzer.seen();
        assert!(!seen[0].path.exists());
    }
}
