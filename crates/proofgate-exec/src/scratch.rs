//! Scratch files handed to external tools.
//!
//! Every file lives inside a private directory owned by [`Scratch`] and is
//! removed when its [`ScratchFile`] handle is released or dropped, so a
//! failing or cancelled consumer never leaves source text behind.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::{TempDir, TempPath};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ScratchError {
    #[error("failed to create scratch directory: {0}")]
    Dir(#[source] io::Error),
    #[error("failed to create scratch file in {dir}: {source}")]
    Create {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write scratch file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Private directory holding the per-request source files.
#[derive(Debug)]
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    /// Creates a fresh directory under the system temp location.
    pub fn new() -> Result<Self, ScratchError> {
        let dir = tempfile::Builder::new()
            .prefix("proofgate-")
            .tempdir()
            .map_err(ScratchError::Dir)?;
        Ok(Self { dir })
    }

    /// Creates a fresh directory under `parent`.
    pub fn new_in(parent: impl AsRef<Path>) -> Result<Self, ScratchError> {
        let dir = tempfile::Builder::new()
            .prefix("proofgate-")
            .tempdir_in(parent)
            .map_err(ScratchError::Dir)?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `content` verbatim into a uniquely named file ending in `suffix`.
    pub fn materialize(&self, content: &str, suffix: &str) -> Result<ScratchFile, ScratchError> {
        let mut file = tempfile::Builder::new()
            .prefix("source-")
            .suffix(suffix)
            .tempfile_in(self.root())
            .map_err(|source| ScratchError::Create {
                dir: self.root().to_path_buf(),
                source,
            })?;
        let path = file.path().to_path_buf();
        // On a failed write `file` is dropped here, which unlinks it.
        file.write_all(content.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| ScratchError::Write { path, source })?;
        Ok(ScratchFile {
            path: file.into_temp_path(),
        })
    }
}

/// Exclusive handle to one materialized source file.
///
/// Dropping the handle deletes the file; [`ScratchFile::release`] does the
/// same eagerly. Either way the deletion happens at most once.
#[derive(Debug)]
pub struct ScratchFile {
    path: TempPath,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(self) {
        let shown = self.path.to_path_buf();
        if let Err(err) = self.path.close() {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %shown.display(), error = %err, "failed to remove scratch file");
            }
        }
    }
}
