//! Refactoring swarm file-operations CLI.
//!
//! Every command works inside the configured sandbox root (`sandbox_root` in
//! `.swarm/config.toml`, `SWARM_SANDBOX`, or `--sandbox`). Paths are relative
//! to that root; anything resolving outside it is refused.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use swarm::audit::audit_code;
use swarm::core::encoding::Encoding;
use swarm::core::types::{ErrorKind, OperationResult};
use swarm::exit_codes;
use swarm::io::analyzer::PylintAnalyzer;
use swarm::io::config::{DEFAULT_CONFIG_PATH, SwarmConfig, load_config, write_config};
use swarm::io::file_store::{FileStore, ReadOptions, WriteOptions};
use swarm::io::sandbox::SandboxGuard;

#[derive(Parser)]
#[command(
    name = "swarm",
    version,
    about = "Sandboxed file operations for the refactoring swarm"
)]
struct Cli {
    /// Config file (TOML). Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the sandbox root.
    #[arg(long, global = true)]
    sandbox: Option<PathBuf>,

    /// Debug-level diagnostics on stderr (ignored when `RUST_LOG` is set).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the canonical path a candidate resolves to inside the sandbox.
    Validate { path: PathBuf },
    /// Print a file's content.
    Read {
        path: PathBuf,
        #[arg(long)]
        encoding: Option<Encoding>,
        /// Print the operation result as JSON instead of the content.
        #[arg(long)]
        json: bool,
    },
    /// Atomically replace a file with content read from stdin.
    Write {
        path: PathBuf,
        #[arg(long)]
        encoding: Option<Encoding>,
        /// Skip backing up the current file.
        #[arg(long)]
        no_backup: bool,
        #[arg(long)]
        json: bool,
    },
    /// Copy a file to a timestamped backup.
    Backup {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Stage a local file in the sandbox and run the analyzer on it.
    Audit { file: PathBuf },
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    swarm::logging::init(cli.verbose);
    if let Command::Init { force } = cli.command {
        return cmd_init(&cli.config, force);
    }

    let cfg = resolve_config(&cli.config, cli.sandbox.as_deref())?;
    let guard = SandboxGuard::new(&cfg.sandbox_root)?;
    let mut store = FileStore::new(guard);
    if let Some(dir) = &cfg.backup_dir {
        store = store.with_backup_dir(dir)?;
    }

    match cli.command {
        Command::Init { .. } => Ok(exit_codes::OK),
        Command::Validate { path } => cmd_validate(&store, &path),
        Command::Read {
            path,
            encoding,
            json,
        } => {
            let options = ReadOptions {
                encoding: encoding.unwrap_or(cfg.default_encoding),
            };
            let result = store.read_file(&path, options);
            if result.is_success() && !json {
                print!("{}", result.content().unwrap_or_default());
                std::io::stdout().flush().context("flush stdout")?;
                return Ok(exit_codes::OK);
            }
            report(&result, json)
        }
        Command::Write {
            path,
            encoding,
            no_backup,
            json,
        } => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("read content from stdin")?;
            let options = WriteOptions {
                encoding: encoding.unwrap_or(cfg.default_encoding),
                create_backup: cfg.create_backups && !no_backup,
            };
            report(&store.write_file(&path, &content, options), json)
        }
        Command::Backup { path, json } => report(&store.create_backup(&path), json),
        Command::Audit { file } => {
            let code = fs::read_to_string(&file)
                .with_context(|| format!("read {}", file.display()))?;
            let analyzer = PylintAnalyzer::new(&cfg.analyzer);
            let analysis = audit_code(&store, &analyzer, &code)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&analysis).context("serialize analysis")?
            );
            Ok(if analysis.success {
                exit_codes::OK
            } else {
                exit_codes::OPERATION_FAILED
            })
        }
    }
}

fn resolve_config(path: &Path, sandbox: Option<&Path>) -> Result<SwarmConfig> {
    let mut cfg = load_config(path)?;
    cfg.apply_env(|key| std::env::var(key).ok());
    if let Some(root) = sandbox {
        cfg.sandbox_root = root.to_path_buf();
    }
    cfg.validate()?;
    Ok(cfg)
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        eprintln!("{} already exists", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &SwarmConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    Ok(exit_codes::OK)
}

fn cmd_validate(store: &FileStore, path: &Path) -> Result<i32> {
    match store.guard().validate(path) {
        Ok(resolved) => {
            println!("{}", resolved.display());
            Ok(exit_codes::OK)
        }
        Err(violation) => {
            eprintln!("{violation}");
            Ok(exit_codes::SECURITY_VIOLATION)
        }
    }
}

/// Print a result and map it to an exit code.
///
/// Failures always go to stderr; successes print the resolved path unless
/// `json` asks for the full summary on stdout.
fn report(result: &OperationResult, json: bool) -> Result<i32> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result.summary()).context("serialize result")?
        );
    } else if result.is_success() {
        println!("{}", result.filepath().display());
        if let Some(backup) = &result.metadata().backup_path {
            println!("backup: {backup}");
        }
    }

    match result.error() {
        None => Ok(exit_codes::OK),
        Some(err) => {
            if !json {
                eprintln!("{}", err.message);
            }
            Ok(match err.kind {
                ErrorKind::SecurityError => exit_codes::SECURITY_VIOLATION,
                ErrorKind::NotFound | ErrorKind::InvalidTarget | ErrorKind::IoError => {
                    exit_codes::OPERATION_FAILED
                }
            })
        }
    }
}
