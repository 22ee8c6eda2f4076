//! File loading for included diagrams

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Source of included files
pub trait FileLoader: Send + Sync {
    /// Resolve `file` against `base` (the declaring class or including
    /// diagram directory) into the key used for loading and deduplication.
    fn canonicalize(&self, base: &Path, file: &Path) -> PathBuf;

    /// Read a file resolved by [`canonicalize`](Self::canonicalize)
    fn load(&self, path: &Path) -> io::Result<String>;
}

/// Lexically normalize a path: drop `.` and fold `..` where possible
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn join(base: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        base.join(file)
    }
}

/// Loads files from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl FsLoader {
    pub fn new() -> Self {
        Self
    }
}

impl FileLoader for FsLoader {
    fn canonicalize(&self, base: &Path, file: &Path) -> PathBuf {
        let joined = join(base, file);
        std::fs::canonicalize(&joined).unwrap_or_else(|_| normalize_path(&joined))
    }

    fn load(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Serves files from memory; used for embedded diagrams and in tests
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: HashMap<PathBuf, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file; the path is normalized the same way lookups are
    pub fn insert(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.files.insert(normalize_path(path.as_ref()), content.into());
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FileLoader for MemoryLoader {
    fn canonicalize(&self, base: &Path, file: &Path) -> PathBuf {
        normalize_path(&join(base, file))
    }

    fn load(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
        })
    }
}
