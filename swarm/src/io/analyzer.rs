//! Static-analysis collaborator seam.
//!
//! The file store hands an [`Analyzer`] a validated path; the analyzer owns
//! its external process and returns structured findings. Tests use scripted
//! analyzers that never spawn processes.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::core::pylint::{Issue, parse_report};
use crate::io::config::AnalyzerConfig;
use crate::io::process::{Exit, run_bounded};

/// Pylint exit status bit for usage errors.
const PYLINT_USAGE_ERROR: i32 = 32;
/// Pylint exit status bit for fatal messages (the file could not be analyzed).
const PYLINT_FATAL: i32 = 1;

/// Structured findings for one analyzed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub success: bool,
    pub score: Option<f64>,
    pub issues: Vec<Issue>,
    pub error: Option<String>,
    pub metadata: AnalysisMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub path: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl AnalysisReport {
    pub fn failed(path: &Path, error: impl Into<String>) -> Self {
        Self::failed_with(
            AnalysisMetadata {
                path: path.display().to_string(),
                ..AnalysisMetadata::default()
            },
            error,
        )
    }

    pub fn failed_with(metadata: AnalysisMetadata, error: impl Into<String>) -> Self {
        Self {
            success: false,
            score: None,
            issues: Vec::new(),
            error: Some(error.into()),
            metadata,
        }
    }
}

/// Abstraction over static-analysis backends.
pub trait Analyzer {
    /// Analyze the file at `path`, which has already passed sandbox validation.
    fn analyze(&self, path: &Path) -> Result<AnalysisReport>;
}

/// Analyzer that spawns pylint (or any command speaking its JSON reporters).
#[derive(Debug, Clone)]
pub struct PylintAnalyzer {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl PylintAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl Analyzer for PylintAnalyzer {
    #[instrument(skip_all, fields(path = %path.display(), timeout_secs = self.timeout.as_secs()))]
    fn analyze(&self, path: &Path) -> Result<AnalysisReport> {
        let Some((program, args)) = self.command.split_first() else {
            return Ok(AnalysisReport::failed(path, "analyzer command is empty"));
        };
        let mut cmd = Command::new(program);
        cmd.args(args).arg(path);

        let output = match run_bounded(cmd, self.timeout, self.output_limit_bytes) {
            Ok(output) => output,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "analyzer did not run");
                return Ok(AnalysisReport::failed(path, format!("{err:#}")));
            }
        };
        let metadata = AnalysisMetadata {
            path: path.display().to_string(),
            exit_code: output.exit.code(),
            timed_out: output.exit == Exit::TimedOut,
            duration_ms: u64::try_from(output.elapsed.as_millis()).unwrap_or(u64::MAX),
        };

        let code = match output.exit {
            Exit::Code(code) if code & PYLINT_USAGE_ERROR == 0 => code,
            Exit::Code(code) => {
                return Ok(AnalysisReport::failed_with(
                    metadata,
                    format!("analyzer exited with {code}: {}", output.stderr.trim()),
                ));
            }
            Exit::Signaled => {
                return Ok(AnalysisReport::failed_with(
                    metadata,
                    format!("analyzer killed by a signal: {}", output.stderr.trim()),
                ));
            }
            Exit::TimedOut => {
                return Ok(AnalysisReport::failed_with(
                    metadata,
                    format!("analyzer timed out after {:?}", self.timeout),
                ));
            }
        };

        let report = match parse_report(&output.stdout, &output.stderr) {
            Ok(report) => report,
            Err(err) => return Ok(AnalysisReport::failed_with(metadata, format!("{err:#}"))),
        };

        let fatal = code & PYLINT_FATAL != 0;
        info!(
            issues = report.issues.len(),
            score = ?report.score,
            fatal,
            "analysis finished"
        );
        Ok(AnalysisReport {
            success: !fatal,
            score: report.score,
            issues: report.issues,
            error: fatal.then(|| "analyzer reported a fatal message".to_string()),
            metadata,
        })
    }
}
