//! Environment setup operations declared under `up`.
//!
//! Each entry of the `up` list is either an operation name or a single-key
//! mapping `{name: config}`. Operations are built from their own
//! unwrapped configuration subtree, then run `up` in declared order or
//! `down` in reverse order from the repository root.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use omni_core::ConfigError;
use omni_core::types::UpDirection;
use serde_yaml::{Mapping, Value};
use tracing::{debug, info, warn};

pub trait Operation {
    /// Human-readable name used in progress and error messages.
    fn name(&self) -> &str;

    fn up(&self) -> Result<()>;

    fn down(&self) -> Result<()>;
}

/// Builds an operation from its configuration and its index in `up`.
pub type OperationBuilder = fn(&Value, usize) -> Result<Box<dyn Operation>>;

#[derive(Default)]
pub struct OperationRegistry {
    builders: BTreeMap<String, OperationBuilder>,
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.builders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, builder: OperationBuilder) -> &mut Self {
        self.builders.insert(name.into(), builder);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }

    /// Build every operation of an `up` value. Nothing is run; the first
    /// invalid entry or unknown operation aborts the whole build.
    pub fn build(&self, up: &Value) -> Result<Vec<Box<dyn Operation>>> {
        let entries = parse_up_config(up)?;
        let mut operations = Vec::with_capacity(entries.len());
        for (index, (name, config)) in entries.into_iter().enumerate() {
            let builder = self
                .builders
                .get(&name)
                .ok_or_else(|| ConfigError::UnknownOperation {
                    index,
                    name: name.clone(),
                })?;
            let operation = builder(&config, index)
                .with_context(|| format!("Invalid configuration for operation {index} ({name})"))?;
            debug!(index, name = %name, "Prepared operation");
            operations.push(operation);
        }
        Ok(operations)
    }
}

/// Split an `up` value into `(operation name, operation config)` pairs.
///
/// A bare string stands for an operation with an empty configuration.
pub fn parse_up_config(up: &Value) -> Result<Vec<(String, Value)>, ConfigError> {
    let Value::Sequence(entries) = up else {
        return Err(ConfigError::UpNotAList);
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| match entry {
            Value::String(name) => Ok((name.clone(), Value::Mapping(Mapping::new()))),
            Value::Mapping(map) if map.len() == 1 => match map.iter().next() {
                Some((Value::String(name), config)) => Ok((name.clone(), config.clone())),
                _ => Err(ConfigError::InvalidUpConfig {
                    index,
                    reason: "operation name must be a string".into(),
                }),
            },
            _ => Err(ConfigError::InvalidUpConfig {
                index,
                reason: "expected an operation name or a single-key mapping".into(),
            }),
        })
        .collect()
}

/// Restores the previous working directory on drop.
struct WorkingDirGuard {
    previous: PathBuf,
}

impl WorkingDirGuard {
    fn enter(dir: &Path) -> Result<Self> {
        let previous = std::env::current_dir().context("Failed to read current directory")?;
        std::env::set_current_dir(dir)
            .with_context(|| format!("Failed to enter {}", dir.display()))?;
        Ok(Self { previous })
    }
}

impl Drop for WorkingDirGuard {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.previous) {
            warn!(path = %self.previous.display(), error = %e, "Failed to restore working directory");
        }
    }
}

/// Run `operations` from `repo_root`: `up` in order, `down` in reverse.
/// Stops at the first failure.
pub fn run_operations(
    operations: &[Box<dyn Operation>],
    direction: UpDirection,
    repo_root: &Path,
) -> Result<()> {
    let _cwd = WorkingDirGuard::enter(repo_root)?;

    let mut ordered: Vec<&dyn Operation> = operations.iter().map(|op| &**op).collect();
    if direction == UpDirection::Down {
        ordered.reverse();
    }

    for operation in ordered {
        info!(operation = operation.name(), direction = %direction, "Running operation");
        let result = match direction {
            UpDirection::Up => operation.up(),
            UpDirection::Down => operation.down(),
        };
        result.with_context(|| format!("Operation '{}' failed ({direction})", operation.name()))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
