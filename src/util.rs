//! # Utility Module
//!
//! Filesystem and privilege helpers shared by the processors and workers.

use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{info, warn};

/// Ensure `path` exists as a directory, creating it (and parents) if absent.
///
/// An existing non-directory at `path` is reported as
/// [`io::ErrorKind::NotADirectory`].
pub fn ensure_dir(path: &Path) -> io::Result<()> {
    if path.exists() {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} exists, but is not a directory", path.display()),
            ));
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o002 != 0 {
                warn!("directory is world-writable: {}", path.display());
            }
        }
        return Ok(());
    }
    info!("Creating local directory {}", path.display());
    std::fs::create_dir_all(path)
}

/// Create a fresh, uniquely named directory under `root`.
///
/// Safe to call concurrently on the same root; every call gets its own
/// directory. The directory outlives this call and must be removed by the
/// caller.
pub fn unique_dir(root: &Path, prefix: &str) -> io::Result<PathBuf> {
    ensure_dir(root)?;
    let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(root)?;
    Ok(dir.keep())
}

/// Join a relative path below `base`, refusing anything that escapes it.
///
/// Leading `/` is ignored so `"/images/disk.raw"` resolves inside `base`;
/// `..` components are rejected.
pub fn join_inside(base: &Path, relative: &Path) -> Option<PathBuf> {
    let mut joined = base.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    Some(joined)
}

/// True when `path` is a regular file with at least one byte.
pub fn has_content(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// Whether privileged commands should go through sudo.
///
/// Root never needs it, whatever the configuration says.
pub fn needs_sudo(use_sudo: bool) -> bool {
    use_sudo && !running_as_root()
}

#[cfg(unix)]
fn running_as_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_dir_creates_nested_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("a").join("b");
        ensure_dir(&root).expect("create");
        assert!(root.is_dir());
        ensure_dir(&root).expect("already there");
    }

    #[test]
    fn ensure_dir_rejects_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("not_a_dir");
        std::fs::write(&file, b"x").expect("write");
        let err = ensure_dir(&file).expect_err("file");
        assert_eq!(err.kind(), io::ErrorKind::NotADirectory);
    }

    #[test]
    fn unique_dirs_do_not_collide() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = unique_dir(dir.path(), "casefile").expect("a");
        let b = unique_dir(dir.path(), "casefile").expect("b");
        assert_ne!(a, b);
        assert!(a.is_dir() && b.is_dir());
        assert!(
            a.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("casefile"))
        );
    }

    #[test]
    fn join_inside_strips_root_and_rejects_parent() {
        let base = Path::new("/mnt/casefile1");
        assert_eq!(
            join_inside(base, Path::new("/images/disk.raw")),
            Some(PathBuf::from("/mnt/casefile1/images/disk.raw"))
        );
        assert_eq!(
            join_inside(base, Path::new("./a/b")),
            Some(PathBuf::from("/mnt/casefile1/a/b"))
        );
        assert_eq!(join_inside(base, Path::new("../etc/passwd")), None);
    }

    #[test]
    fn has_content_requires_non_empty_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let empty = dir.path().join("empty");
        let full = dir.path().join("full");
        std::fs::write(&empty, b"").expect("write");
        std::fs::write(&full, b"data").expect("write");
        assert!(!has_content(&empty));
        assert!(has_content(&full));
        assert!(!has_content(dir.path()));
        assert!(!has_content(&dir.path().join("missing")));
    }

    #[test]
    fn sudo_disabled_means_no_sudo() {
        assert!(!needs_sudo(false));
    }
}
