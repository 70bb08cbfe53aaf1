//! Test-only helpers for sandboxes and scripted analyzers.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::io::analyzer::{AnalysisMetadata, AnalysisReport, Analyzer};
use crate::io::file_store::FileStore;
use crate::io::sandbox::SandboxGuard;

/// Temporary sandbox root with a ready file store. Removed on drop.
pub struct TestSandbox {
    temp: TempDir,
    store: FileStore,
}

impl TestSandbox {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let guard = SandboxGuard::new(temp.path().join("sandbox"))?;
        Ok(Self {
            temp,
            store: FileStore::new(guard),
        })
    }

    /// Directory containing the sandbox root; handy for planting outside files.
    pub fn outside(&self) -> &Path {
        self.temp.path()
    }

    pub fn root(&self) -> &Path {
        self.store.guard().root()
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn guard(&self) -> &SandboxGuard {
        self.store.guard()
    }

    /// Write raw bytes under the root, bypassing the store.
    pub fn seed(&self, relative: &str, bytes: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Backup files (`*.bak`) directly inside `relative_dir`, sorted.
    pub fn backups_in(&self, relative_dir: &str) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(self.root().join(relative_dir))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "bak") {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }
}

/// What a scripted analyzer observed when it was called.
#[derive(Debug, Clone)]
pub struct SeenFile {
    pub path: PathBuf,
    pub content: Option<String>,
}

enum Script {
    Report(AnalysisReport),
    Error(String),
}

/// Analyzer returning a canned outcome and recording the files it was given.
pub struct ScriptedAnalyzer {
    script: Script,
    seen: Mutex<Vec<SeenFile>>,
}

impl ScriptedAnalyzer {
    pub fn passing(score: f64) -> Self {
        Self {
            script: Script::Report(AnalysisReport {
                success: true,
                score: Some(score),
                issues: Vec::new(),
                error: None,
                metadata: AnalysisMetadata::default(),
            }),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn erroring(message: &str) -> Self {
        Self {
            script: Script::Error(message.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<SeenFile> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

impl Analyzer for ScriptedAnalyzer {
    fn analyze(&self, path: &Path) -> Result<AnalysisReport> {
        let seen = SeenFile {
            path: path.to_path_buf(),
            content: fs::read_to_string(path).ok(),
        };
        self.seen
            .lock()
            .map_err(|_| anyhow!("scripted analyzer lock poisoned"))?
            .push(seen);
        match &self.script {
            Script::Report(report) => Ok(AnalysisReport {
                metadata: AnalysisMetadata {
                    path: path.display().to_string(),
                    ..report.metadata.clone()
                },
                ..report.clone()
            }),
            Script::Error(message) => Err(anyhow!("{message}")),
        }
    }
}
