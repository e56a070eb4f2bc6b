//! Filesystem path normalization applied while merging.
//!
//! Paths declared under `path.append`, `path.prepend` and
//! `org[*].worktree` are resolved relative to the file that declared them,
//! never relative to the working directory of the process.

use std::path::{Path, PathBuf};

use omni_core::ConfigError;

use crate::merge::ValueTransform;
use crate::value::{ConfigValue, PathSegment};

#[derive(Debug, Clone, Default)]
pub struct PathTransform {
    home: Option<PathBuf>,
}

impl PathTransform {
    pub fn new(home: Option<PathBuf>) -> Self {
        Self { home }
    }

    /// Whether the value at `keypath` names a filesystem path.
    pub fn applies_to(keypath: &[PathSegment]) -> bool {
        match keypath {
            [PathSegment::Key(root), PathSegment::Key(list), PathSegment::Index(_)] => {
                root == "path" && (list == "append" || list == "prepend")
            }
            [PathSegment::Key(root), PathSegment::Index(_), PathSegment::Key(field)] => {
                root == "org" && field == "worktree"
            }
            _ => false,
        }
    }
}

impl ValueTransform for PathTransform {
    fn transform(
        &self,
        mut value: ConfigValue,
        keypath: &[PathSegment],
    ) -> Result<ConfigValue, ConfigError> {
        if !Self::applies_to(keypath) {
            return Ok(value);
        }
        let Some(raw) = value.as_str() else {
            return Ok(value);
        };
        let resolved = resolve_path(raw, self.home.as_deref(), value.origin());
        if resolved != raw {
            value.set(&serde_yaml::Value::String(resolved));
        }
        Ok(value)
    }
}

/// Expand `~/` against `home` and resolve relative paths against the
/// directory containing `origin`. Absolute paths are returned unchanged, as
/// is anything that cannot be resolved for lack of a home or an origin.
pub fn resolve_path(raw: &str, home: Option<&Path>, origin: Option<&Path>) -> String {
    if let Some(rest) = raw.strip_prefix("~/") {
        return match home {
            Some(home) => home.join(rest).to_string_lossy().into_owned(),
            None => raw.to_string(),
        };
    }

    let path = Path::new(raw);
    if path.is_absolute() {
        return raw.to_string();
    }

    match origin.and_then(Path::parent) {
        Some(dir) => dir.join(path).to_string_lossy().into_owned(),
        None => raw.to_string(),
    }
}
