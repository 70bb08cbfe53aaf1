//! Backup copies of sandboxed files.
//!
//! Backups are plain files; the directory listing is the only catalog.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::path::backup_file_name;

/// Upper bound on counter suffixes tried within a single timestamp.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Copy `source` byte for byte into `dir` under a name derived from `stamp`.
///
/// Names are claimed with create-new semantics, so concurrent backups of the
/// same file never overwrite each other. A partially written copy is removed.
pub fn copy_to_backup(source: &Path, dir: &Path, stamp: &str) -> io::Result<PathBuf> {
    let file_name = source.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("backup source has no file name: {}", source.display()),
        )
    })?;
    fs::create_dir_all(dir)?;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = dir.join(backup_file_name(file_name, stamp, attempt));
        let mut dest = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        };

        let copied = File::open(source)
            .and_then(|mut src| io::copy(&mut src, &mut dest))
            .and_then(|bytes| dest.sync_all().map(|()| bytes));
        return match copied {
            Ok(bytes) => {
                debug!(backup = %candidate.display(), bytes, "backup copied");
                Ok(candidate)
            }
            Err(err) => {
                drop(dest);
                let _ = fs::remove_file(&candidate);
                Err(err)
            }
        };
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!(
            "no free backup name for {} at {stamp}",
            source.display()
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_bytes_exactly() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = temp.path().join("blob.bin");
        fs::write(&source, [0u8, 159, 146, 150, 255]).expect("seed");

        let backup =
            copy_to_backup(&source, &temp.path().join("bk"), "20260101T000000.000000").expect("copy");
        assert_eq!(fs::read(&backup).expect("read"), vec![0u8, 159, 146, 150, 255]);
        assert_eq!(fs::read(&source).expect("read"), vec![0u8, 159, 146, 150, 255]);
    }

    #[test]
    fn same_stamp_gets_counter_suffix() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = temp.path().join("a.py");
        fs::write(&source, "x=1").expect("seed");

        let first = copy_to_backup(&source, temp.path(), "S").expect("first");
        let second = copy_to_backup(&source, temp.path(), "S").expect("second");
        assert_eq!(first, temp.path().join("a.py.S.bak"));
        assert_eq!(second, temp.path().join("a.py.S.1.bak"));
    }

    #[test]
    fn missing_source_leaves_no_partial_backup() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = copy_to_backup(&temp.path().join("gone.py"), temp.path(), "S")
            .expect_err("missing source");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!temp.path().join("gone.py.S.bak").exists());
    }
}
