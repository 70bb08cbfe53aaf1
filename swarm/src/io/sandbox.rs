//! Sandbox root and path validation.
//!
//! [`SandboxGuard`] is the only authority on whether a path may be touched.
//! Candidates are canonicalized with [`soft_canonicalize`], which follows
//! symbolic links (including dangling ones) and appends components that do
//! not exist yet, so a link planted inside the root that points elsewhere is
//! judged by its target and write targets under missing directories validate
//! against their would-be location.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use soft_canonicalize::soft_canonicalize;
use thiserror::Error;
use tracing::{debug, warn};

/// A candidate path resolved outside the sandbox root, or could not be resolved at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "path outside sandbox: {} (sandbox root {})",
    .attempted_path.display(),
    .sandbox_root.display()
)]
pub struct SecurityViolation {
    pub attempted_path: PathBuf,
    pub sandbox_root: PathBuf,
}

/// Handle to a canonical sandbox root. Cheap to clone; the root never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxGuard {
    root: Arc<PathBuf>,
}

impl SandboxGuard {
    /// Create `root` if needed and pin its canonical form.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)
            .with_context(|| format!("create sandbox root {}", root.display()))?;
        let canonical = soft_canonicalize(root)
            .with_context(|| format!("canonicalize sandbox root {}", root.display()))?;
        debug!(root = %canonical.display(), "sandbox root ready");
        Ok(Self {
            root: Arc::new(canonical),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `candidate` and confirm it is the root or a descendant of it.
    ///
    /// Relative candidates are taken relative to the root. The returned path
    /// is canonical and must be used for all subsequent filesystem calls.
    pub fn validate(&self, candidate: impl AsRef<Path>) -> Result<PathBuf, SecurityViolation> {
        let candidate = candidate.as_ref();
        let violation = || SecurityViolation {
            attempted_path: candidate.to_path_buf(),
            sandbox_root: self.root.to_path_buf(),
        };

        let resolved = match soft_canonicalize(&self.root.join(candidate)) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(path = %candidate.display(), err = %err, "path could not be resolved");
                return Err(violation());
            }
        };

        if !self.contains(&resolved) {
            warn!(
                path = %candidate.display(),
                resolved = %resolved.display(),
                "path escapes sandbox"
            );
            return Err(violation());
        }
        Ok(resolved)
    }

    /// Component-wise containment check for an already resolved path.
    pub fn contains(&self, resolved: &Path) -> bool {
        resolved.starts_with(self.root.as_path())
    }

    /// Path of `resolved` relative to the root, if it is inside.
    pub fn relative<'a>(&self, resolved: &'a Path) -> Option<&'a Path> {
        resolved.strip_prefix(self.root.as_path()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> (tempfile::TempDir, SandboxGuard) {
        let temp = tempfile::tempdir().expect("tempdir");
        let guard = SandboxGuard::new(temp.path().join("sb")).expect("guard");
        (temp, guard)
    }

    #[test]
    fn new_creates_missing_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("nested").join("sb");
        let guard = SandboxGuard::new(&root).expect("guard");
        assert!(root.is_dir());
        assert!(guard.root().is_absolute());
    }

    #[test]
    fn relative_path_resolves_under_root() {
        let (_temp, guard) = guard();
        let resolved = guard.validate("a.py").expect("inside");
        assert_eq!(resolved, guard.root().join("a.py"));
    }

    #[test]
    fn root_itself_is_allowed() {
        let (_temp, guard) = guard();
        assert_eq!(guard.validate("").expect("root"), guard.root());
        assert_eq!(guard.validate(".").expect("root"), guard.root());
    }

    #[test]
    fn parent_traversal_is_rejected() {
        let (_temp, guard) = guard();
        let err = guard.validate("../../etc/passwd").expect_err("escape");
        assert_eq!(err.attempted_path, PathBuf::from("../../etc/passwd"));
        assert_eq!(err.sandbox_root, guard.root());
    }

    #[test]
    fn absolute_path_outside_is_rejected() {
        let (temp, guard) = guard();
        assert!(guard.validate(temp.path().join("other.txt")).is_err());
        assert!(guard.validate("/etc/passwd").is_err());
    }

    #[test]
    fn absolute_path_inside_is_allowed() {
        let (_temp, guard) = guard();
        let inside = guard.root().join("pkg").join("mod.py");
        assert_eq!(guard.validate(&inside).expect("inside"), inside);
    }

    /// `/x/sb2` shares a string prefix with `/x/sb` but is not inside it.
    #[test]
    fn sibling_with_shared_prefix_is_rejected() {
        let (temp, guard) = guard();
        fs::create_dir_all(temp.path().join("sb2")).expect("mkdir");
        assert!(guard.validate("../sb2/a.py").is_err());
    }

    #[test]
    fn validation_is_idempotent() {
        let (_temp, guard) = guard();
        fs::create_dir_all(guard.root().join("pkg")).expect("mkdir");
        let first = guard.validate("pkg/./sub/../a.py").expect("inside");
        let second = guard.validate(&first).expect("inside");
        assert_eq!(first, second);
        assert_eq!(first, guard.root().join("pkg").join("a.py"));
    }

    #[test]
    fn new_file_under_missing_directories_validates() {
        let (_temp, guard) = guard();
        let resolved = guard.validate("new/deeper/file.py").expect("inside");
        assert_eq!(resolved, guard.root().join("new/deeper/file.py"));
        assert!(!guard.root().join("new").exists());
    }

    /// Traversal through directories that do not exist yet is still caught.
    #[test]
    fn traversal_through_missing_directories_is_rejected() {
        let (_temp, guard) = guard();
        assert!(guard.validate("new/../../escape.py").is_err());
        assert_eq!(
            guard.validate("new/../kept.py").expect("inside"),
            guard.root().join("kept.py")
        );
    }

    #[test]
    fn failed_validation_does_not_touch_disk() {
        let (temp, guard) = guard();
        let _ = guard.validate("../outside/dir/file.py");
        assert!(!temp.path().join("outside").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_rejected() {
        let (temp, guard) = guard();
        let outside = temp.path().join("outside");
        fs::create_dir_all(&outside).expect("mkdir");
        fs::write(outside.join("secret.txt"), "secret").expect("write");
        std::os::unix::fs::symlink(&outside, guard.root().join("link")).expect("symlink");

        assert!(guard.validate("link/secret.txt").is_err());
        assert!(guard.validate("link/new.txt").is_err());
    }

    /// A dangling link is judged by where it points, not by its own location.
    #[cfg(unix)]
    #[test]
    fn dangling_symlink_escape_is_rejected() {
        let (temp, guard) = guard();
        let target = temp.path().join("not-yet-created.txt");
        std::os::unix::fs::symlink(&target, guard.root().join("dangling")).expect("symlink");

        assert!(guard.validate("dangling").is_err());
        assert!(!target.exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_within_root_resolves_to_target() {
        let (_temp, guard) = guard();
        fs::create_dir_all(guard.root().join("real")).expect("mkdir");
        std::os::unix::fs::symlink("real", guard.root().join("alias")).expect("symlink");

        let resolved = guard.validate("alias/a.py").expect("inside");
        assert_eq!(resolved, guard.root().join("real").join("a.py"));
    }

    /// Whatever `..` after a link resolves to, it is never outside the root.
    #[cfg(unix)]
    #[test]
    fn parent_of_escaping_symlink_stays_contained() {
        let (temp, guard) = guard();
        let outside = temp.path().join("outside").join("dir");
        fs::create_dir_all(&outside).expect("mkdir");
        std::os::unix::fs::symlink(&outside, guard.root().join("l")).expect("symlink");

        for candidate in ["l/../x", "l/../../x", "l/x/../../y"] {
            if let Ok(resolved) = guard.validate(candidate) {
                assert!(resolved.starts_with(guard.root()), "{candidate}: {resolved:?}");
            }
        }
        assert!(!temp.path().join("outside").join("x").exists());
    }

    #[cfg(unix)]
    #[test]
    fn relative_symlink_back_into_root_is_allowed() {
        let (_temp, guard) = guard();
        fs::create_dir_all(guard.root().join("inner")).expect("mkdir");
        std::os::unix::fs::symlink("../sb/inner", guard.root().join("rel")).expect("symlink");

        let resolved = guard.validate("rel/a").expect("inside");
        assert_eq!(resolved, guard.root().join("inner").join("a"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_to_ancestor_is_rejected() {
        let (_temp, guard) = guard();
        std::os::unix::fs::symlink("../..", guard.root().join("up")).expect("symlink");
        assert!(guard.validate("up/x").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_loop_is_rejected() {
        let (_temp, guard) = guard();
        std::os::unix::fs::symlink("b", guard.root().join("a")).expect("symlink");
        std::os::unix::fs::symlink("a", guard.root().join("b")).expect("symlink");
        assert!(guard.validate("a/file.txt").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn root_given_through_symlink_is_canonicalized() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("real")).expect("mkdir");
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("via"))
            .expect("symlink");

        let guard = SandboxGuard::new(temp.path().join("via")).expect("guard");
        let resolved = guard
            .validate(temp.path().join("via").join("a.py"))
            .expect("inside");
        assert!(resolved.starts_with(guard.root()));
        assert!(guard.root().ends_with("real"));
    }
}
