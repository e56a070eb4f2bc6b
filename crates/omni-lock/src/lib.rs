//! Advisory file locking using the `flock(2)` syscall directly.
//! Independent crate with no internal omni dependencies.
//!
//! Uses raw `libc::flock` instead of RAII lock wrappers to avoid the
//! self-referential struct problem: an RAII guard borrows the lock owner,
//! making it impossible to hand out the locked `File` for reading and
//! writing while the guard is stored next to it.
//!
//! By calling `flock(2)` directly, we only need to own the `File` (which
//! owns the fd). `Drop` calls `flock(fd, LOCK_UN)` to release.
//!
//! `flock` locks belong to the open file description, so two independent
//! `open(2)` calls on the same path contend with each other even inside
//! one process.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Kind of advisory lock to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Concurrent readers allowed, excluded by any writer.
    Shared,
    /// Excludes all other readers and writers.
    Exclusive,
}

impl LockMode {
    fn operation(self) -> libc::c_int {
        match self {
            Self::Shared => libc::LOCK_SH,
            Self::Exclusive => libc::LOCK_EX,
        }
    }
}

/// Lock guard backed by `flock(2)`.
///
/// Holds the open `File` whose fd carries the advisory lock.
/// On `Drop`, the lock is explicitly released via `flock(fd, LOCK_UN)`.
pub struct FileLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl std::fmt::Debug for FileLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLock")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        // SAFETY: `fd` is a valid file descriptor owned by `self.file`.
        // `LOCK_UN` releases the advisory lock. If the call fails (which is
        // extremely unlikely for a valid fd), the lock will still be released
        // when the fd is closed moments later.
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
    }
}

impl FileLock {
    /// Open `path` for the given mode and block until the lock is held.
    ///
    /// `Exclusive` opens read-write and creates the file (mode `0644`) when
    /// missing; `Shared` opens an existing file read-only.
    pub fn open(path: &Path, mode: LockMode) -> Result<Self> {
        let file = open_for(path, mode)?;
        Self::acquire(file, path, mode)
    }

    /// Take a blocking lock on an already opened file.
    pub fn acquire(file: File, path: &Path, mode: LockMode) -> Result<Self> {
        let fd = file.as_raw_fd();
        loop {
            // SAFETY: `fd` is a valid file descriptor from the `File` we own.
            // The return value is checked for error handling.
            let ret = unsafe { libc::flock(fd, mode.operation()) };
            if ret == 0 {
                break;
            }
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err)
                .with_context(|| format!("Failed to lock {}", path.display()));
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            mode,
        })
    }

    /// Non-blocking variant of [`FileLock::open`].
    ///
    /// Returns `Ok(None)` when another open file description holds a
    /// conflicting lock.
    pub fn try_open(path: &Path, mode: LockMode) -> Result<Option<Self>> {
        let file = open_for(path, mode)?;
        let fd = file.as_raw_fd();

        // SAFETY: `fd` is a valid file descriptor from the `File` we just opened.
        // `LOCK_NB` makes the request fail with EWOULDBLOCK instead of waiting.
        let ret = unsafe { libc::flock(fd, mode.operation() | libc::LOCK_NB) };
        if ret == 0 {
            return Ok(Some(Self {
                file,
                path: path.to_path_buf(),
                mode,
            }));
        }

        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::WouldBlock {
            Ok(None)
        } else {
            Err(err).with_context(|| format!("Failed to lock {}", path.display()))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

fn open_for(path: &Path, mode: LockMode) -> Result<File> {
    let mut options = OpenOptions::new();
    options.read(true);
    if mode == LockMode::Exclusive {
        options.write(true).create(true).truncate(false).mode(0o644);
    }
    options
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))
}
