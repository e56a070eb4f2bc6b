//! Layered configuration store.
//!
//! Builds one provenance-carrying tree from the built-in defaults, the user
//! configuration files and, inside a repository, the repository-local files
//! (labeled [`GIT_REPO_LABEL`]). All views are computed on demand from the
//! final tree.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use omni_core::ConfigError;
use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

use crate::defaults::load_defaults;
use crate::env::OmniEnv;
use crate::merge::{Merger, SUGGEST_CONFIG_KEY};
use crate::transform::PathTransform;
use crate::value::ConfigValue;

/// Label attached to every value read from a file inside the active
/// repository.
pub const GIT_REPO_LABEL: &str = "git_repo";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    tree: ConfigValue,
    loaded_files: Vec<PathBuf>,
    env: OmniEnv,
}

impl ConfigStore {
    /// Store holding only the built-in defaults.
    pub fn with_defaults(env: OmniEnv) -> Result<Self> {
        let tree = load_defaults(&env)?;
        Ok(Self {
            tree,
            loaded_files: Vec::new(),
            env,
        })
    }

    /// Defaults, then user files, then repository files when `env` has a
    /// repository root. Later files take precedence.
    pub fn load(env: OmniEnv) -> Result<Self> {
        let mut store = Self::with_defaults(env)?;

        for path in store.env.config_files() {
            store.import_file(&path, &[])?;
        }
        for path in store.env.repo_config_files() {
            store.import_file(&path, &[GIT_REPO_LABEL])?;
        }

        debug!(
            files = store.loaded_files.len(),
            in_repo = store.env.in_repo(),
            "Configuration loaded"
        );
        Ok(store)
    }

    /// Merge one YAML file on top of the current tree.
    ///
    /// Missing and unreadable files are skipped. A file that fails to parse
    /// contributes nothing but is still recorded in [`Self::loaded_files`].
    /// A file whose top level is neither empty nor a mapping aborts with
    /// [`ConfigError::MalformedConfig`].
    pub fn import_file(&mut self, path: &Path, labels: &[&str]) -> Result<()> {
        if !path.is_file() {
            debug!(path = %path.display(), "Configuration file not found, skipping");
            return Ok(());
        }

        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read configuration file, skipping");
                return Ok(());
            }
        };

        debug!(path = %path.display(), labels = ?labels, "Importing configuration file");

        let raw = if content.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            match serde_yaml::from_slice::<Value>(&content) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Invalid configuration file, ignoring its content");
                    self.loaded_files.push(path.to_path_buf());
                    return Ok(());
                }
            }
        };

        match raw {
            Value::Null => {}
            Value::Mapping(_) => {
                let added = ConfigValue::wrap(&raw, Some(path), labels);
                let transform = PathTransform::new(self.env.home.clone());
                self.tree = Merger::new()
                    .with_transform(&transform)
                    .merge(Some(&self.tree), &added)
                    .with_context(|| format!("Failed to merge configuration: {}", path.display()))?;
            }
            _ => {
                return Err(ConfigError::MalformedConfig {
                    path: path.to_path_buf(),
                }
                .into());
            }
        }

        self.loaded_files.push(path.to_path_buf());
        Ok(())
    }

    pub fn env(&self) -> &OmniEnv {
        &self.env
    }

    /// Files that were considered during loading, in load order.
    pub fn loaded_files(&self) -> &[PathBuf] {
        &self.loaded_files
    }

    pub fn tree(&self) -> &ConfigValue {
        &self.tree
    }

    /// Unwrapped value at `keypath`.
    pub fn get(&self, keypath: &[&str]) -> Option<Value> {
        self.tree.get(keypath).map(ConfigValue::to_plain)
    }

    /// Value at `keypath` with its provenance.
    pub fn node(&self, keypath: &[&str]) -> Option<&ConfigValue> {
        self.tree.get(keypath)
    }

    /// The whole tree, unwrapped.
    pub fn plain(&self) -> Value {
        self.tree.to_plain()
    }

    /// Independent copy of the provenance-carrying tree.
    pub fn with_src(&self) -> ConfigValue {
        self.tree.deep_dup()
    }

    /// The unwrapped `path` subtree.
    pub fn path(&self) -> Mapping {
        self.get(&["path"]).and_then(into_mapping).unwrap_or_default()
    }

    /// The `path` subtree, optionally without the repository's
    /// contributions.
    pub fn paths(&self, include_local: bool) -> ConfigValue {
        let path = self.tree.get(&["path"]);
        let selected = if include_local {
            path.cloned()
        } else {
            path.and_then(|path| path.reject_label(GIT_REPO_LABEL))
        };
        selected.unwrap_or_else(ConfigValue::empty_map)
    }

    /// `path.prepend`, then `OMNIPATH`, then `path.append`, deduplicated.
    pub fn effective_path(&self, include_local: bool) -> Vec<String> {
        let paths = self.paths(include_local);
        let entries = |key: &str| {
            paths
                .get(&[key])
                .and_then(ConfigValue::as_sequence)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| scalar_to_string(&item.to_plain()))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        };

        let combined = entries("prepend")
            .into_iter()
            .chain(self.env.omnipath.iter().cloned())
            .chain(entries("append"));
        dedupe(combined)
    }

    /// `OMNI_ORG` entries followed by the user's own `org` entries.
    /// Repository-declared orgs are never included.
    pub fn effective_orgs(&self) -> Vec<Value> {
        let configured = self
            .tree
            .get(&["org"])
            .and_then(|org| org.reject_label(GIT_REPO_LABEL))
            .map(|org| org.to_plain());
        let configured = match configured {
            Some(Value::Sequence(items)) => items,
            _ => Vec::new(),
        };

        let combined = self
            .env
            .omni_org
            .iter()
            .map(|org| Value::String(org.clone()))
            .chain(configured);
        dedupe(combined)
    }

    /// The repository-declared part of `path`; empty outside a repository.
    pub fn repo_only_path(&self) -> Mapping {
        self.repo_selected(&["path"])
    }

    /// The repository-declared part of `suggest_config`; empty outside a
    /// repository.
    pub fn suggested_from_repo(&self) -> Mapping {
        self.repo_selected(&[SUGGEST_CONFIG_KEY])
    }

    /// The unwrapped `up` subtree.
    pub fn up(&self) -> Option<Value> {
        self.get(&["up"]).filter(|value| !value.is_null())
    }

    fn repo_selected(&self, keypath: &[&str]) -> Mapping {
        if !self.env.in_repo() {
            return Mapping::new();
        }
        self.tree
            .get(keypath)
            .and_then(|value| value.select_label(GIT_REPO_LABEL))
            .and_then(|value| into_mapping(value.to_plain()))
            .unwrap_or_default()
    }
}

fn into_mapping(value: Value) -> Option<Mapping> {
    match value {
        Value::Mapping(map) => Some(map),
        _ => None,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn dedupe<T: PartialEq>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut unique = Vec::new();
    for item in items {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    unique
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
