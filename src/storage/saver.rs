//! Persists uploaded audio into the configured temp directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("no temp dir configured")]
    NoTempDir,

    #[error("can't create temp dir {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can't create file {path:?}: {source}")]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can't write file {path:?}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Stores a named blob and returns where it ended up.
#[async_trait]
pub trait FileSaver: Send + Sync {
    async fn save(&self, name: &str, data: &[u8]) -> Result<PathBuf, SaveError>;
}

/// Saves files into a single directory on local disk.
#[derive(Debug, Clone)]
pub struct TempSaver {
    dir: PathBuf,
}

impl TempSaver {
    /// Create the saver, making `dir` (and its parents) if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, SaveError> {
        let dir = dir.as_ref();
        if dir.as_os_str().is_empty() {
            return Err(SaveError::NoTempDir);
        }
        create_private_dir(dir).map_err(|source| SaveError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

#[async_trait]
impl FileSaver for TempSaver {
    async fn save(&self, name: &str, data: &[u8]) -> Result<PathBuf, SaveError> {
        let path = self.dir.join(name);

        let mut file = fs::File::create(&path)
            .await
            .map_err(|source| SaveError::CreateFailed {
                path: path.clone(),
                source,
            })?;

        let written = async {
            file.write_all(data).await?;
            file.flush().await
        }
        .await;

        if let Err(source) = written {
            drop(file);
            if let Err(e) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Can't remove partially written file");
            }
            return Err(SaveError::WriteFailed { path, source });
        }

        debug!(path = %path.display(), bytes = data.len(), "Saved upload");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_dir() {
        assert!(matches!(TempSaver::new(""), Err(SaveError::NoTempDir)));
    }

    #[test]
    fn test_new_creates_missing_dir() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nested").join("tmp");

        let saver = TempSaver::new(&dir).unwrap();

        assert!(dir.is_dir());
        assert_eq!(saver.dir(), dir.as_path());
    }

    #[tokio::test]
    async fn test_save_writes_content() {
        let root = tempfile::tempdir().unwrap();
        let saver = TempSaver::new(root.path()).unwrap();

        let path = saver.save("f.wav", b"olia").await.unwrap();

        assert_eq!(path, root.path().join("f.wav"));
        assert_eq!(std::fs::read(&path).unwrap(), b"olia");
    }

    #[tokio::test]
    async fn test_save_fails_when_dir_vanished() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("gone");
        let saver = TempSaver::new(&dir).unwrap();
        std::fs::remove_dir(&dir).unwrap();

        let err = saver.save("f.wav", b"olia").await.unwrap_err();

        assert!(matches!(err, SaveError::CreateFailed { .. }));
    }
}
