use std::cell::Cell;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use stockroom_storage::{FileSystem, OsFileSystem};

/// The real file system with switches that make individual operations fail.
#[derive(Debug, Default)]
pub struct FaultyFs {
    inner: OsFileSystem,
    pub fail_copy: Cell<bool>,
    pub fail_write: Cell<bool>,
}

impl FaultyFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn injected(op: &str) -> io::Error {
        io::Error::new(io::ErrorKind::PermissionDenied, format!("injected {op} failure"))
    }
}

impl FileSystem for FaultyFs {
    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        self.inner.modified(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.inner.read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if self.fail_write.get() {
            return Err(Self::injected("write"));
        }
        self.inner.write(path, contents)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.inner.remove_file(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        if self.fail_copy.get() {
            return Err(Self::injected("copy"));
        }
        self.inner.copy(from, to)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        self.inner.canonicalize(path)
    }
}
