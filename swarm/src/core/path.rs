//! Helpers for rendering deterministic backup paths.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

pub const BACKUP_EXTENSION: &str = "bak";

/// Return the backup file name for `file_name` taken at `stamp`.
///
/// `attempt` 0 yields `<name>.<stamp>.bak`; later attempts insert a counter
/// (`<name>.<stamp>.<attempt>.bak`) so names stay unique within one timestamp.
pub fn backup_file_name(file_name: &OsStr, stamp: &str, attempt: u32) -> OsString {
    let mut name = file_name.to_os_string();
    name.push(".");
    name.push(stamp);
    if attempt > 0 {
        name.push(format!(".{attempt}"));
    }
    name.push(".");
    name.push(BACKUP_EXTENSION);
    name
}

/// Directory that receives backups of a file in `relative_parent`.
///
/// With no backup root, backups sit beside the file. With one, the file's
/// directory layout relative to the sandbox root is mirrored beneath it.
pub fn backup_dir_for(
    sandbox_root: &Path,
    relative_parent: &Path,
    backup_root: Option<&Path>,
) -> PathBuf {
    match backup_root {
        Some(root) => root.join(relative_parent),
        None => sandbox_root.join(relative_parent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_has_no_counter() {
        let name = backup_file_name(OsStr::new("a.py"), "20260101T000000.000001", 0);
        assert_eq!(name, OsString::from("a.py.20260101T000000.000001.bak"));
    }

    #[test]
    fn retries_insert_counter_before_extension() {
        let name = backup_file_name(OsStr::new("a.py"), "20260101T000000.000001", 2);
        assert_eq!(name, OsString::from("a.py.20260101T000000.000001.2.bak"));
    }

    #[test]
    fn backup_dir_mirrors_layout_under_backup_root() {
        let dir = backup_dir_for(
            Path::new("/sb"),
            Path::new("pkg/mod"),
            Some(Path::new("/sb/.backups")),
        );
        assert_eq!(dir, PathBuf::from("/sb/.backups/pkg/mod"));
        let sibling = backup_dir_for(Path::new("/sb"), Path::new("pkg"), None);
        assert_eq!(sibling, PathBuf::from("/sb/pkg"));
    }
}
