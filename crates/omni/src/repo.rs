//! Repository discovery and store construction for command handlers.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use omni_config::{ConfigStore, OmniEnv};

/// Root of the git working tree containing `dir`, if any.
pub(crate) fn find_repo_root(dir: &Path) -> Option<PathBuf> {
    let output = match Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(dir)
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!("Failed to run git: {e}");
            return None;
        }
    };

    if !output.status.success() {
        return None;
    }

    let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if root.is_empty() {
        None
    } else {
        Some(PathBuf::from(root))
    }
}

pub(crate) fn determine_work_dir(cd: Option<&str>) -> Result<PathBuf> {
    match cd {
        Some(dir) => {
            let dir = PathBuf::from(dir);
            if !dir.is_dir() {
                anyhow::bail!("Not a directory: {}", dir.display());
            }
            Ok(dir)
        }
        None => std::env::current_dir().context("Failed to determine current directory"),
    }
}

/// Load the layered configuration as seen from `cd` (or the CWD).
pub(crate) fn load_store(cd: Option<&str>) -> Result<ConfigStore> {
    let work_dir = determine_work_dir(cd)?;
    let repo_root = find_repo_root(&work_dir);
    tracing::debug!(work_dir = %work_dir.display(), repo_root = ?repo_root, "Loading configuration");
    let env = OmniEnv::from_process().with_repo_root(repo_root);
    ConfigStore::load(env)
}
