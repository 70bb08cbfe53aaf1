//! Sandboxed read, atomic write and backup operations.
//!
//! Every public operation follows the same pipeline: validate the path with
//! [`SandboxGuard`], act on the resolved path, and report an
//! [`OperationResult`]. Expected failures never escape as `Err`.
//!
//! Writes stage content in a uniquely named temporary file next to the target
//! and rename it into place, so readers observe either the old or the new
//! content and a failed replace leaves the original untouched.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::core::encoding::{Encoding, decode_with_fallback, line_count};
use crate::core::path::backup_dir_for;
use crate::core::types::{ErrorKind, Metadata, OperationResult};
use crate::io::backup::copy_to_backup;
use crate::io::sandbox::{SandboxGuard, SecurityViolation};

/// Reads a file's bytes along with its modification time.
pub(crate) type Load = fn(&Path) -> io::Result<(Vec<u8>, Option<SystemTime>)>;

/// Final step of an atomic write: move the staged file over the target.
pub(crate) type Replace = fn(NamedTempFile, &Path) -> io::Result<()>;

fn persist_replace(staged: NamedTempFile, target: &Path) -> io::Result<()> {
    staged.persist(target).map(drop).map_err(|err| err.error)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub encoding: Encoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub encoding: Encoding,
    /// Copy the current file aside before replacing it.
    pub create_backup: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            encoding: Encoding::Utf8,
            create_backup: true,
        }
    }
}

/// File operations confined to one sandbox root.
#[derive(Debug, Clone)]
pub struct FileStore {
    guard: SandboxGuard,
    backup_root: Option<PathBuf>,
    load: Load,
    replace: Replace,
}

impl FileStore {
    /// Store that keeps backups beside the files they copy.
    pub fn new(guard: SandboxGuard) -> Self {
        Self {
            guard,
            backup_root: None,
            load: read_with_mtime,
            replace: persist_replace,
        }
    }

    /// Keep backups under `dir` (relative to the sandbox root), mirroring the
    /// layout of the files they copy.
    pub fn with_backup_dir(mut self, dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let resolved = self
            .guard
            .validate(dir)
            .with_context(|| format!("backup dir {}", dir.display()))?;
        if resolved == self.guard.root() {
            return Err(anyhow!("backup dir must be below the sandbox root"));
        }
        self.backup_root = Some(resolved);
        Ok(self)
    }

    #[cfg(test)]
    pub(crate) fn with_load(mut self, load: Load) -> Self {
        self.load = load;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_replace(mut self, replace: Replace) -> Self {
        self.replace = replace;
        self
    }

    pub fn guard(&self) -> &SandboxGuard {
        &self.guard
    }

    /// Read a text file, falling back to Latin-1 when the bytes do not decode.
    #[instrument(skip_all, fields(path = %path.as_ref().display(), encoding = %options.encoding))]
    pub fn read_file(&self, path: impl AsRef<Path>, options: ReadOptions) -> OperationResult {
        let requested = path.as_ref();
        let safe_path = match self.guard.validate(requested) {
            Ok(path) => path,
            Err(violation) => return security_failure(requested, &violation),
        };

        match fs::metadata(&safe_path) {
            Ok(meta) if !meta.is_file() => {
                return OperationResult::failure(
                    safe_path.clone(),
                    ErrorKind::InvalidTarget,
                    format!("Not a file: {}", safe_path.display()),
                );
            }
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return OperationResult::failure(
                    safe_path.clone(),
                    ErrorKind::NotFound,
                    format!("File not found: {}", safe_path.display()),
                );
            }
            Err(err) => return io_failure(safe_path, "stat", &err),
        }

        let (bytes, modified) = match (self.load)(&safe_path) {
            Ok(read) => read,
            Err(err) => return io_failure(safe_path, "read", &err),
        };

        let decoded = decode_with_fallback(&bytes, options.encoding);
        if decoded.fell_back {
            warn!(
                path = %safe_path.display(),
                requested = %options.encoding,
                "decode failed, fell back to latin-1"
            );
        }

        let metadata = Metadata {
            size_bytes: Some(bytes.len() as u64),
            encoding: Some(decoded.encoding),
            encoding_fallback: decoded.fell_back.then_some(true),
            line_count: Some(line_count(&decoded.text)),
            modified_time: modified.map(iso_timestamp),
            ..Metadata::default()
        };
        debug!(path = %safe_path.display(), size_bytes = bytes.len(), "file read");
        OperationResult::success(safe_path, Some(decoded.text), metadata)
    }

    /// Atomically replace (or create) a file with `content`.
    #[instrument(skip_all, fields(path = %path.as_ref().display(), encoding = %options.encoding, create_backup = options.create_backup))]
    pub fn write_file(
        &self,
        path: impl AsRef<Path>,
        content: &str,
        options: WriteOptions,
    ) -> OperationResult {
        let requested = path.as_ref();
        let safe_path = match self.guard.validate(requested) {
            Ok(path) => path,
            Err(violation) => return security_failure(requested, &violation),
        };

        let bytes = match options.encoding.encode(content) {
            Ok(bytes) => bytes,
            Err(err) => {
                return OperationResult::failure(
                    safe_path,
                    ErrorKind::IoError,
                    format!("Encoding error: {err}"),
                );
            }
        };

        let existing = match fs::metadata(&safe_path) {
            Ok(meta) if !meta.is_file() => {
                return OperationResult::failure(
                    safe_path.clone(),
                    ErrorKind::InvalidTarget,
                    format!("Not a file: {}", safe_path.display()),
                );
            }
            Ok(meta) => Some(meta),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return io_failure(safe_path, "stat", &err),
        };

        let Some(parent) = safe_path.parent().map(Path::to_path_buf) else {
            return OperationResult::failure(
                safe_path.clone(),
                ErrorKind::InvalidTarget,
                format!("No parent directory: {}", safe_path.display()),
            );
        };
        if let Err(err) = fs::create_dir_all(&parent) {
            return io_failure(safe_path, "create parent directories", &err);
        }

        let mut metadata = Metadata {
            backup_created: Some(false),
            ..Metadata::default()
        };
        if options.create_backup && existing.is_some() {
            match self.backup(&safe_path) {
                Ok(backup_path) => {
                    metadata.backup_created = Some(true);
                    metadata.backup_path = Some(backup_path.display().to_string());
                }
                Err(err) => {
                    warn!(path = %safe_path.display(), err = %err, "backup failed, writing anyway");
                }
            }
        }

        let staged = match stage(&parent, &bytes, existing.as_ref()) {
            Ok(staged) => staged,
            Err(err) => {
                return io_failure(safe_path, "stage temporary file", &err)
                    .with_metadata(metadata);
            }
        };
        if let Err(err) = (self.replace)(staged, &safe_path) {
            warn!(path = %safe_path.display(), err = %err, "replace failed, original kept");
            return io_failure(safe_path, "replace", &err).with_metadata(metadata);
        }

        metadata.bytes_written = Some(bytes.len() as u64);
        metadata.encoding = Some(options.encoding);
        metadata.line_count = Some(line_count(content));
        info!(
            path = %safe_path.display(),
            bytes = bytes.len(),
            backup = ?metadata.backup_path,
            "file written"
        );
        OperationResult::success(safe_path, None, metadata)
    }

    /// Copy an existing file to a fresh, timestamped backup path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn create_backup(&self, path: impl AsRef<Path>) -> OperationResult {
        let requested = path.as_ref();
        let safe_path = match self.guard.validate(requested) {
            Ok(path) => path,
            Err(violation) => return security_failure(requested, &violation),
        };

        let size = match fs::metadata(&safe_path) {
            Ok(meta) if !meta.is_file() => {
                return OperationResult::failure(
                    safe_path.clone(),
                    ErrorKind::InvalidTarget,
                    format!("Not a file: {}", safe_path.display()),
                );
            }
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return OperationResult::failure(
                    safe_path.clone(),
                    ErrorKind::NotFound,
                    format!("File not found: {}", safe_path.display()),
                );
            }
            Err(err) => return io_failure(safe_path, "stat", &err),
        };

        match self.backup(&safe_path) {
            Ok(backup_path) => {
                let metadata = Metadata {
                    size_bytes: Some(size),
                    created_time: Some(iso_timestamp(SystemTime::now())),
                    backup_created: Some(true),
                    backup_path: Some(backup_path.display().to_string()),
                    ..Metadata::default()
                };
                OperationResult::success(safe_path, None, metadata)
            }
            Err(err) => io_failure(safe_path, "backup", &err),
        }
    }

    /// Delete a regular file inside the sandbox.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn remove_file(&self, path: impl AsRef<Path>) -> OperationResult {
        let requested = path.as_ref();
        let safe_path = match self.guard.validate(requested) {
            Ok(path) => path,
            Err(violation) => return security_failure(requested, &violation),
        };

        match fs::symlink_metadata(&safe_path) {
            Ok(meta) if !meta.is_file() => {
                return OperationResult::failure(
                    safe_path.clone(),
                    ErrorKind::InvalidTarget,
                    format!("Not a file: {}", safe_path.display()),
                );
            }
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return OperationResult::failure(
                    safe_path.clone(),
                    ErrorKind::NotFound,
                    format!("File not found: {}", safe_path.display()),
                );
            }
            Err(err) => return io_failure(safe_path, "stat", &err),
        }

        if let Err(err) = fs::remove_file(&safe_path) {
            return io_failure(safe_path, "remove", &err);
        }
        debug!(path = %safe_path.display(), "file removed");
        OperationResult::success(safe_path, None, Metadata::default())
    }

    fn backup(&self, safe_path: &Path) -> io::Result<PathBuf> {
        let relative_parent = safe_path
            .parent()
            .and_then(|parent| self.guard.relative(parent))
            .ok_or_else(|| io::Error::other("backup source has no parent inside sandbox"))?;
        let dir = backup_dir_for(
            self.guard.root(),
            relative_parent,
            self.backup_root.as_deref(),
        );
        let dir = self.guard.validate(&dir).map_err(|violation| {
            io::Error::new(io::ErrorKind::PermissionDenied, violation.to_string())
        })?;
        let stamp = Local::now().format("%Y%m%dT%H%M%S%.6f").to_string();
        let backup_path = copy_to_backup(safe_path, &dir, &stamp)?;
        info!(
            source = %safe_path.display(),
            backup = %backup_path.display(),
            "backup created"
        );
        Ok(backup_path)
    }
}

fn read_with_mtime(path: &Path) -> io::Result<(Vec<u8>, Option<SystemTime>)> {
    let mut file = File::open(path)?;
    let modified = file.metadata()?.modified().ok();
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok((bytes, modified))
}

/// Write `bytes` to a fresh temporary file in `dir` and flush it to disk.
fn stage(dir: &Path, bytes: &[u8], existing: Option<&fs::Metadata>) -> io::Result<NamedTempFile> {
    let mut staged = tempfile::Builder::new()
        .prefix(".swarm-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    if let Some(meta) = existing
        && let Err(err) = fs::set_permissions(staged.path(), meta.permissions())
    {
        warn!(path = %staged.path().display(), err = %err, "could not carry over permissions");
    }
    Ok(staged)
}

fn iso_timestamp(time: SystemTime) -> String {
    DateTime::<Local>::from(time).to_rfc3339()
}

fn security_failure(requested: &Path, violation: &SecurityViolation) -> OperationResult {
    OperationResult::failure(
        requested.to_path_buf(),
        ErrorKind::SecurityError,
        format!("Security violation: {violation}"),
    )
}

fn io_failure(path: PathBuf, action: &str, err: &io::Error) -> OperationResult {
    OperationResult::failure(
        path,
        ErrorKind::IoError,
        format!("I/O error during {action}: {err}"),
    )
}
