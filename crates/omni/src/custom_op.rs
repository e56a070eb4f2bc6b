//! The `custom` up operation: arbitrary shell commands.
//!
//! ```yaml
//! up:
//!   - custom:
//!       name: Build tools
//!       met?: test -x bin/tool
//!       meet: make tools
//!       unmeet: rm -rf bin/tool
//! ```

use anyhow::{Context, Result};
use serde_yaml::Value;
use std::process::Command;
use tracing::info;

use omni_config::Operation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CustomOperation {
    name: String,
    meet: String,
    met: Option<String>,
    unmeet: Option<String>,
}

impl CustomOperation {
    pub(crate) fn from_config(config: &Value, index: usize) -> Result<Self> {
        let field = |key: &str| -> Result<Option<String>> {
            match config.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(_) => anyhow::bail!("'{key}' must be a string"),
            }
        };

        let meet = field("meet")?.context("custom operation requires a 'meet' command")?;
        let name = field("name")?.unwrap_or_else(|| format!("custom #{index}"));
        Ok(Self {
            name,
            meet,
            met: field("met?")?,
            unmeet: field("unmeet")?,
        })
    }

    pub(crate) fn build(config: &Value, index: usize) -> Result<Box<dyn Operation>> {
        Ok(Box::new(Self::from_config(config, index)?))
    }
}

impl Operation for CustomOperation {
    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self) -> Result<()> {
        if let Some(met) = &self.met {
            if run_shell(met)? {
                info!(operation = %self.name, "Already met, skipping");
                return Ok(());
            }
        }
        if !run_shell(&self.meet)? {
            anyhow::bail!("'{}' meet command failed: {}", self.name, self.meet);
        }
        Ok(())
    }

    fn down(&self) -> Result<()> {
        let Some(unmeet) = &self.unmeet else {
            return Ok(());
        };
        if !run_shell(unmeet)? {
            anyhow::bail!("'{}' unmeet command failed: {}", self.name, unmeet);
        }
        Ok(())
    }
}

/// Run `command` with `sh -c`, returning whether it exited successfully.
fn run_shell(command: &str) -> Result<bool> {
    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .status()
        .with_context(|| format!("Failed to run: {command}"))?;
    Ok(status.success())
}
