//! Filesystem access for units that move stored files.

use std::io;
use std::path::{Path, PathBuf};

/// Minimal file-moving collaborator.
pub trait FileMover: Send + Sync {
    /// Whether the path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Move `from` to `to`.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// [`FileMover`] over the local filesystem, resolving relative paths
/// against a root directory.
#[derive(Debug, Clone)]
pub struct FsFileMover {
    root: PathBuf,
}

impl FsFileMover {
    /// Create a mover rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl Default for FsFileMover {
    fn default() -> Self {
        Self::new(".")
    }
}

impl FileMover for FsFileMover {
    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let to = self.resolve(to);
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(self.resolve(from), to)
    }
}
