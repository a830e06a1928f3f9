//! # Scratch Store
//!
//! `ScratchStore` hands out uniquely named paths under a fixed root directory.
//! `ScratchResource` owns one of those paths for the lifetime of a request.
//!
//! ## Lifecycle:
//! 1. **acquire**: a uuid-named file or directory is created under the root
//! 2. **use**: the owner writes media into it and passes the path to tools
//! 3. **release**: the path is deleted, either explicitly or when the handle drops
//!
//! Release is idempotent: a path that is already gone is not an error. The
//! `Drop` implementation covers every early return (`?`) between acquire and
//! release, so no code path can leak a scratch resource.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Root of all scratch resources. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ScratchStore {
    root: Arc<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceKind {
    File,
    Dir,
}

/// An ownership-scoped handle to a scratch file or directory.
#[derive(Debug)]
pub struct ScratchResource {
    path: PathBuf,
    kind: ResourceKind,
    released: bool,
}

impl ScratchStore {
    /// Create the scratch root if it does not exist yet. Called once at startup.
    pub fn init(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "Scratch root ready");
        Ok(Self { root: Arc::new(root) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create an empty, uniquely named file ending in `suffix` (e.g. ".mp3").
    pub fn acquire_file(&self, suffix: &str) -> io::Result<ScratchResource> {
        let path = self.root.join(format!("{}{}", Uuid::new_v4(), suffix));
        fs::OpenOptions::new().write(true).create_new(true).open(&path)?;
        debug!(path = %path.display(), "Acquired scratch file");
        Ok(ScratchResource {
            path,
            kind: ResourceKind::File,
            released: false,
        })
    }

    /// Create a uniquely named directory; `label` only makes it easier to spot.
    pub fn acquire_dir(&self, label: &str) -> io::Result<ScratchResource> {
        let path = self.root.join(format!("{}-{}", label, Uuid::new_v4()));
        fs::create_dir(&path)?;
        debug!(path = %path.display(), "Acquired scratch directory");
        Ok(ScratchResource {
            path,
            kind: ResourceKind::Dir,
            released: false,
        })
    }
}

impl ScratchResource {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the resource now and report any I/O error other than "not found".
    pub fn release(mut self) -> io::Result<()> {
        self.remove()
    }

    /// True when `candidate` is this directory or lies inside it.
    pub fn contains(&self, candidate: &Path) -> bool {
        self.kind == ResourceKind::Dir && candidate.starts_with(&self.path)
    }

    fn remove(&mut self) -> io::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let result = match self.kind {
            ResourceKind::File => fs::remove_file(&self.path),
            ResourceKind::Dir => fs::remove_dir_all(&self.path),
        };

        match result {
            Ok(()) => {
                debug!(path = %self.path.display(), "Released scratch resource");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for ScratchResource {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!(path = %self.path.display(), error = %e, "Failed to release scratch resource");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_init_creates_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("nested").join("scratch");
        let store = ScratchStore::init(&root).unwrap();
        assert!(store.root().is_dir());
    }

    #[test]
    fn test_acquired_files_are_unique_and_keep_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ScratchStore::init(tmp.path()).unwrap();

        let a = store.acquire_file(".wav").unwrap();
        let b = store.acquire_file(".wav").unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().to_string_lossy().ends_with(".wav"));
        assert!(a.path().is_file());
        assert_eq!(entries(tmp.path()), 2);
    }

    #[test]
    fn test_release_deletes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ScratchStore::init(tmp.path()).unwrap();

        let file = store.acquire_file(".mp3").unwrap();
        let path = file.path().to_path_buf();
        fs::write(&path, b"audio").unwrap();

        file.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_release_is_idempotent_when_path_already_gone() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ScratchStore::init(tmp.path()).unwrap();

        let file = store.acquire_file(".m4a").unwrap();
        fs::remove_file(file.path()).unwrap();
        assert!(file.release().is_ok());
    }

    #[test]
    fn test_drop_releases_directory_with_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ScratchStore::init(tmp.path()).unwrap();

        let path = {
            let dir = store.acquire_dir("audio").unwrap();
            fs::write(dir.path().join("abc123.mp3"), b"data").unwrap();
            dir.path().to_path_buf()
        };

        assert!(!path.exists());
        assert_eq!(entries(tmp.path()), 0);
    }

    #[test]
    fn test_contains_only_applies_to_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ScratchStore::init(tmp.path()).unwrap();

        let dir = store.acquire_dir("subs").unwrap();
        assert!(dir.contains(&dir.path().join("id.zh.vtt")));
        assert!(!dir.contains(&tmp.path().join("elsewhere.vtt")));

        let file = store.acquire_file(".wav").unwrap();
        assert!(!file.contains(file.path()));
    }
}
