//! Locked read-modify-write of the user's own configuration file.
//!
//! The edited file is a plain mapping: no origin or labels are persisted.
//! Readers take a shared `flock(2)`, writers an exclusive one, held for the
//! whole read-modify-write so concurrent invocations never observe or
//! persist a torn edit.

use std::ffi::CString;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use omni_core::ConfigError;
use omni_lock::{FileLock, LockMode};
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::store::ConfigStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

impl AccessMode {
    fn lock_mode(self) -> LockMode {
        match self {
            Self::ReadOnly => LockMode::Shared,
            Self::ReadWrite => LockMode::Exclusive,
        }
    }

    fn access_flags(self) -> libc::c_int {
        match self {
            Self::ReadOnly => libc::R_OK,
            Self::ReadWrite => libc::R_OK | libc::W_OK,
        }
    }
}

/// Run `f` on the current content of the user configuration file.
///
/// Without `explicit_path`, the file is the highest-precedence entry of
/// `candidates` (lowest precedence first) that exists and is accessible
/// for `mode`. When none exists, read-only access calls `f` with an empty
/// mapping without touching the filesystem, and read-write access creates
/// the file at the first candidate whose closest existing ancestor is
/// writable.
///
/// Content that fails to parse is handed to `f` as an empty mapping. In
/// read-write mode a `Some` result replaces the file content; `None`
/// leaves the file untouched. Returns what `f` returned.
pub fn with_locked_user_file<F>(
    candidates: &[PathBuf],
    mode: AccessMode,
    explicit_path: Option<&Path>,
    f: F,
) -> Result<Option<Mapping>>
where
    F: FnOnce(Mapping) -> Option<Mapping>,
{
    let existing = match explicit_path {
        Some(path) => Some(path.to_path_buf()),
        None => find_existing(candidates, mode),
    };

    let path = match (existing, mode) {
        (Some(path), _) => path,
        (None, AccessMode::ReadOnly) => {
            debug!("No user configuration file found, reading empty configuration");
            return Ok(f(Mapping::new()));
        }
        (None, AccessMode::ReadWrite) => {
            find_creatable(candidates).ok_or(ConfigError::NoWritableConfigFile)?
        }
    };

    if mode == AccessMode::ReadOnly && !path.is_file() {
        debug!(path = %path.display(), "User configuration file missing, reading empty configuration");
        return Ok(f(Mapping::new()));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    let mut lock = FileLock::open(&path, mode.lock_mode())?;
    debug!(path = %path.display(), mode = ?mode, "Locked user configuration file");

    let mut content = Vec::new();
    lock.file_mut()
        .read_to_end(&mut content)
        .map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
    let current = parse_lenient(&content, &path);

    let updated = f(current);

    if mode == AccessMode::ReadWrite {
        if let Some(updated) = &updated {
            write_locked(&mut lock, updated)?;
            debug!(path = %path.display(), "Wrote user configuration file");
        }
    }

    Ok(updated)
}

fn find_existing(candidates: &[PathBuf], mode: AccessMode) -> Option<PathBuf> {
    candidates
        .iter()
        .rev()
        .find(|path| path.is_file() && accessible(path, mode.access_flags()))
        .cloned()
}

/// First candidate (highest precedence first) that does not exist yet and
/// whose closest existing ancestor is a writable directory.
fn find_creatable(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates
        .iter()
        .rev()
        .find(|path| {
            if path.exists() {
                return false;
            }
            path.ancestors()
                .skip(1)
                .find(|ancestor| ancestor.exists())
                .is_some_and(|ancestor| {
                    ancestor.is_dir() && accessible(ancestor, libc::R_OK | libc::W_OK | libc::X_OK)
                })
        })
        .cloned()
}

fn accessible(path: &Path, flags: libc::c_int) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the
    // call. `access` only reads it.
    unsafe { libc::access(c_path.as_ptr(), flags) == 0 }
}

fn parse_lenient(content: &[u8], path: &Path) -> Mapping {
    match serde_yaml::from_slice::<Value>(content) {
        Ok(Value::Mapping(map)) => map,
        Ok(_) => Mapping::new(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Unparsable user configuration, treating as empty");
            Mapping::new()
        }
    }
}

fn write_locked(lock: &mut FileLock, content: &Mapping) -> Result<()> {
    let serialized = serde_yaml::to_string(content).context("Failed to serialize user config")?;
    let path = lock.path().to_path_buf();
    let file = lock.file_mut();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.write_all(serialized.as_bytes()))
        .and_then(|_| file.flush())
        .and_then(|_| file.set_len(serialized.len() as u64))
        .map_err(|source| ConfigError::Io { path, source })?;
    Ok(())
}

/// Outcome of [`accept_repo_paths`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathUpdate {
    /// The user file already holds the repository's paths.
    Unchanged,
    /// The new `path` mapping was written.
    Accepted(Mapping),
    /// The caller declined; the file was left untouched.
    Declined,
}

/// New `path` mapping for the user file after accepting `repo_path`.
///
/// Repository `append` entries are pushed and `prepend` entries unshifted
/// one at a time, skipping entries already present. Empty lists are
/// dropped.
pub fn merge_repo_paths(user_config: &Mapping, repo_path: &Mapping) -> Mapping {
    let current_path = user_config.get("path");
    let mut merged = Mapping::new();

    for (key, to_front) in [("append", false), ("prepend", true)] {
        let mut entries: Vec<Value> = current_path
            .and_then(|path| path.get(key))
            .and_then(Value::as_sequence)
            .cloned()
            .unwrap_or_default();

        let repo_entries = repo_path.get(key).and_then(Value::as_sequence);
        for entry in repo_entries.into_iter().flatten() {
            if entries.contains(entry) {
                continue;
            }
            if to_front {
                entries.insert(0, entry.clone());
            } else {
                entries.push(entry.clone());
            }
        }

        let mut unique: Vec<Value> = Vec::with_capacity(entries.len());
        for entry in entries {
            if !unique.contains(&entry) {
                unique.push(entry);
            }
        }
        if !unique.is_empty() {
            merged.insert(Value::String(key.to_string()), Value::Sequence(unique));
        }
    }

    merged
}

/// Persist the repository-declared paths into the user configuration file.
///
/// `proceed` receives the previous `path` value of the user file (if any)
/// and the mapping about to replace it; returning `false` aborts the write.
/// It is not called when nothing would change.
pub fn accept_repo_paths<P>(store: &ConfigStore, proceed: P) -> Result<PathUpdate>
where
    P: FnOnce(Option<&Value>, &Mapping) -> bool,
{
    let repo_path = store.repo_only_path();
    let candidates = store.env().config_files();
    let mut outcome = PathUpdate::Unchanged;

    with_locked_user_file(&candidates, AccessMode::ReadWrite, None, |mut config| {
        let merged = merge_repo_paths(&config, &repo_path);
        let previous = config.get("path");
        let unchanged = match previous {
            Some(previous) => *previous == Value::Mapping(merged.clone()),
            None => merged.is_empty(),
        };
        if unchanged {
            return None;
        }

        if !proceed(previous, &merged) {
            outcome = PathUpdate::Declined;
            return None;
        }

        config.insert(Value::String("path".into()), Value::Mapping(merged.clone()));
        outcome = PathUpdate::Accepted(merged);
        Some(config)
    })?;

    Ok(outcome)
}

#[cfg(test)]
#[path = "user_file_tests.rs"]
mod tests;
