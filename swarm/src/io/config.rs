//! Swarm configuration stored under `.swarm/config.toml`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::encoding::Encoding;

pub const DEFAULT_CONFIG_PATH: &str = ".swarm/config.toml";

/// Environment variable that overrides `sandbox_root`.
pub const SANDBOX_ENV: &str = "SWARM_SANDBOX";

/// Swarm configuration (TOML).
///
/// Missing fields default to the values the agents historically used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SwarmConfig {
    /// Directory all file operations are confined to. Created if absent.
    pub sandbox_root: PathBuf,

    /// Encoding used when a command does not name one.
    pub default_encoding: Encoding,

    /// Whether writes back up the file they replace.
    pub create_backups: bool,

    /// Backup directory relative to the sandbox root. Backups sit beside
    /// their source files when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,

    pub analyzer: AnalyzerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Analyzer command; the staged file path is appended as the last argument.
    pub command: Vec<String>,

    /// Wall-clock budget for one analyzer run.
    pub timeout_secs: u64,

    /// Truncate analyzer stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            command: vec!["pylint".to_string(), "--output-format=json2".to_string()],
            timeout_secs: 120,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            sandbox_root: PathBuf::from("./sandbox"),
            default_encoding: Encoding::Utf8,
            create_backups: true,
            backup_dir: None,
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl SwarmConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sandbox_root.as_os_str().is_empty() {
            return Err(anyhow!("sandbox_root must not be empty"));
        }
        if let Some(dir) = &self.backup_dir {
            let escapes = dir
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if dir.as_os_str().is_empty() || escapes {
                return Err(anyhow!(
                    "backup_dir must be a relative path inside the sandbox, got {}",
                    dir.display()
                ));
            }
        }
        if self.analyzer.timeout_secs == 0 {
            return Err(anyhow!("analyzer.timeout_secs must be > 0"));
        }
        if self.analyzer.output_limit_bytes == 0 {
            return Err(anyhow!("analyzer.output_limit_bytes must be > 0"));
        }
        if self.analyzer.command.is_empty() || self.analyzer.command[0].trim().is_empty() {
            return Err(anyhow!("analyzer.command must be a non-empty array"));
        }
        Ok(())
    }

    /// Apply environment overrides, reading variables through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup(SANDBOX_ENV).filter(|value| !value.trim().is_empty()) {
            self.sandbox_root = PathBuf::from(root);
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SwarmConfig::default()`.
pub fn load_config(path: &Path) -> Result<SwarmConfig> {
    if !path.exists() {
        let cfg = SwarmConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SwarmConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SwarmConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp config in {}", parent.display()))?;
    fs::write(tmp.path(), contents)
        .with_context(|| format!("write temp config {}", tmp.path().display()))?;
    tmp.persist(path)
        .with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, SwarmConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".swarm").join("config.toml");
        let cfg = SwarmConfig {
            default_encoding: Encoding::Latin1,
            backup_dir: Some(PathBuf::from(".backups")),
            ..SwarmConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "sandbox_root = \"work\"\n[analyzer]\ntimeout_secs = 5\n")
            .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.sandbox_root, PathBuf::from("work"));
        assert_eq!(cfg.analyzer.timeout_secs, 5);
        assert_eq!(cfg.analyzer.command, AnalyzerConfig::default().command);
        assert!(cfg.create_backups);
    }

    #[test]
    fn unknown_encoding_fails_to_load() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "default_encoding = \"ebcdic\"\n").expect("write");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn escaping_backup_dir_is_invalid() {
        for dir in ["../bk", "/tmp/bk", ""] {
            let cfg = SwarmConfig {
                backup_dir: Some(PathBuf::from(dir)),
                ..SwarmConfig::default()
            };
            assert!(cfg.validate().is_err(), "{dir} should be rejected");
        }
    }

    #[test]
    fn env_override_replaces_sandbox_root() {
        let mut cfg = SwarmConfig::default();
        cfg.apply_env(|key| (key == SANDBOX_ENV).then(|| "/srv/sb".to_string()));
        assert_eq!(cfg.sandbox_root, PathBuf::from("/srv/sb"));

        let mut untouched = SwarmConfig::default();
        untouched.apply_env(|_| Some("  ".to_string()));
        assert_eq!(untouched.sandbox_root, PathBuf::from("./sandbox"));
    }
}
