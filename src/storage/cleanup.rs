//! Request-scoped cleanup of temporary files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Deletes every tracked path when dropped.
///
/// Drop runs on normal return, on `?` early returns and while unwinding from a
/// panic, so files registered here never outlive the request that made them.
#[derive(Debug, Default)]
pub struct TempFiles {
    paths: Vec<PathBuf>,
}

impl TempFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path for removal. The file doesn't need to exist yet.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            remove(&path);
        }
    }
}

fn remove(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed temp file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Can't remove temp file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_removes_tracked_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("a.musicxml");
        std::fs::write(&a, b"in").unwrap();
        std::fs::write(&b, b"out").unwrap();

        {
            let mut files = TempFiles::new();
            files.track(&a);
            files.track(&b);
        }

        assert!(!a.exists());
        assert!(!b.exists());
    }

    #[test]
    fn test_missing_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = TempFiles::new();
        files.track(dir.path().join("never-created"));
        drop(files);
    }

    #[test]
    fn test_track_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.wav");
        let mut files = TempFiles::new();
        files.track(&path);
        files.track(path.clone());
        assert_eq!(files.paths.len(), 1);
    }

    #[test]
    fn test_cleanup_runs_on_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.wav");
        std::fs::write(&path, b"in").unwrap();

        let result = std::panic::catch_unwind(|| {
            let mut files = TempFiles::new();
            files.track(&path);
            panic!("boom");
        });

        assert!(result.is_err());
        assert!(!path.exists());
    }
}
