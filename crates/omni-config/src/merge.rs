//! Strategy-driven deep merge of [`ConfigValue`] trees.
//!
//! Two trees are combined key-by-key and element-by-element. The policy at
//! each key comes from a [`KeyStrategy`]; the built-in
//! [`DirectiveKeyStrategy`] reads `__toappend`, `__toprepend`,
//! `__toreplace` and `__ifnone` suffixes from the keys themselves and
//! special-cases `path.append`, `path.prepend` and `suggest_config`.
//!
//! Merging never mutates its inputs.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;

use omni_core::ConfigError;
use regex::Regex;

use crate::value::{ConfigMap, ConfigValue, Node, PathSegment};

/// Root key whose subtree is carried through merges untouched by key
/// directives, so that it can later be offered to the user as-is.
pub const SUGGEST_CONFIG_KEY: &str = "suggest_config";

/// How an added value combines with the current value at the same place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Maps merge per key, sequences are replaced, scalars: added wins.
    #[default]
    Default,
    /// Sequences: current then added, deduplicated.
    Append,
    /// Sequences: added then current, deduplicated.
    Prepend,
    /// A present, non-empty current value wins outright.
    Keep,
    /// Structural merge only; keys below are never re-interpreted.
    IgnoreInherit,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Append => "append",
            Self::Prepend => "prepend",
            Self::Keep => "keep",
            Self::IgnoreInherit => "ignore_inherit",
        }
    }

    /// Map a key suffix (`toappend`, `toprepend`, `toreplace`, `ifnone`)
    /// to its strategy.
    pub fn from_suffix(suffix: &str) -> Result<Self, ConfigError> {
        match suffix {
            "toappend" => Ok(Self::Append),
            "toprepend" => Ok(Self::Prepend),
            "toreplace" => Ok(Self::Default),
            "ifnone" => Ok(Self::Keep),
            other => Err(ConfigError::InvalidStrategy(other.to_string())),
        }
    }
}

impl FromStr for MergeStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "append" => Ok(Self::Append),
            "prepend" => Ok(Self::Prepend),
            "keep" => Ok(Self::Keep),
            "ignore_inherit" => Ok(Self::IgnoreInherit),
            other => Err(ConfigError::InvalidStrategy(other.to_string())),
        }
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolves the real key and the strategy to use for one mapping key.
///
/// `keypath` is the path of the mapping holding `key`; `inherited` is the
/// strategy of the enclosing merge call.
pub trait KeyStrategy {
    fn resolve(
        &self,
        key: &str,
        keypath: &[PathSegment],
        inherited: MergeStrategy,
    ) -> Result<(String, MergeStrategy), ConfigError>;
}

impl<F> KeyStrategy for F
where
    F: Fn(&str, &[PathSegment], MergeStrategy) -> Result<(String, MergeStrategy), ConfigError>,
{
    fn resolve(
        &self,
        key: &str,
        keypath: &[PathSegment],
        inherited: MergeStrategy,
    ) -> Result<(String, MergeStrategy), ConfigError> {
        self(key, keypath, inherited)
    }
}

/// The built-in key directive resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectiveKeyStrategy;

impl KeyStrategy for DirectiveKeyStrategy {
    fn resolve(
        &self,
        key: &str,
        keypath: &[PathSegment],
        inherited: MergeStrategy,
    ) -> Result<(String, MergeStrategy), ConfigError> {
        resolve_key_strategy(key, keypath, inherited)
    }
}

fn strategy_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(?P<key>.*)__(?P<strategy>toappend|toprepend|toreplace|ifnone)$").ok())
        .as_ref()
}

/// Key directive resolution, in order:
///
/// 1. below an `ignore_inherit` subtree keys are taken literally;
/// 2. `suggest_config` at the root switches to `ignore_inherit`;
/// 3. `append` / `prepend` directly under `path` use those strategies;
/// 4. a `__toappend|__toprepend|__toreplace|__ifnone` suffix is stripped
///    and mapped to its strategy;
/// 5. otherwise the inherited strategy applies.
pub fn resolve_key_strategy(
    key: &str,
    keypath: &[PathSegment],
    inherited: MergeStrategy,
) -> Result<(String, MergeStrategy), ConfigError> {
    if inherited == MergeStrategy::IgnoreInherit {
        return Ok((key.to_string(), inherited));
    }

    if keypath.is_empty() && key == SUGGEST_CONFIG_KEY {
        return Ok((key.to_string(), MergeStrategy::IgnoreInherit));
    }

    if matches!(keypath, [PathSegment::Key(parent)] if parent == "path")
        && matches!(key, "append" | "prepend")
    {
        return Ok((key.to_string(), key.parse()?));
    }

    if let Some(captures) = strategy_regex().and_then(|re| re.captures(key)) {
        let strategy = MergeStrategy::from_suffix(&captures["strategy"])?;
        return Ok((captures["key"].to_string(), strategy));
    }

    Ok((key.to_string(), inherited))
}

/// Hook applied to scalar values as they are accepted into the tree.
pub trait ValueTransform {
    fn transform(
        &self,
        value: ConfigValue,
        keypath: &[PathSegment],
    ) -> Result<ConfigValue, ConfigError>;
}

impl<F> ValueTransform for F
where
    F: Fn(ConfigValue, &[PathSegment]) -> Result<ConfigValue, ConfigError>,
{
    fn transform(
        &self,
        value: ConfigValue,
        keypath: &[PathSegment],
    ) -> Result<ConfigValue, ConfigError> {
        self(value, keypath)
    }
}

/// Merge engine configured with a key resolver and an optional transform.
#[derive(Clone, Copy)]
pub struct Merger<'a> {
    key_strategy: &'a dyn KeyStrategy,
    transform: Option<&'a dyn ValueTransform>,
}

impl Default for Merger<'_> {
    fn default() -> Self {
        Self {
            key_strategy: &DirectiveKeyStrategy,
            transform: None,
        }
    }
}

impl std::fmt::Debug for Merger<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Merger")
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl<'a> Merger<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_strategy(mut self, key_strategy: &'a dyn KeyStrategy) -> Self {
        self.key_strategy = key_strategy;
        self
    }

    pub fn with_transform(mut self, transform: &'a dyn ValueTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Merge `added` on top of `current`, starting with the default
    /// strategy at the root.
    pub fn merge(
        &self,
        current: Option<&ConfigValue>,
        added: &ConfigValue,
    ) -> Result<ConfigValue, ConfigError> {
        self.merge_with(current, added, MergeStrategy::Default, &[])
    }

    /// Merge at an explicit strategy and key path.
    pub fn merge_with(
        &self,
        current: Option<&ConfigValue>,
        added: &ConfigValue,
        strategy: MergeStrategy,
        keypath: &[PathSegment],
    ) -> Result<ConfigValue, ConfigError> {
        let current = current.filter(|value| !value.is_null());

        if let (Some(current), Node::Mapping(added_map)) = (current, added.value()) {
            if let Node::Mapping(current_map) = current.value() {
                let mut merged = current_map.clone();
                for (key, value) in added_map.iter() {
                    let (real_key, local) = self.key_strategy.resolve(key, keypath, strategy)?;
                    let child_path = child_keypath(keypath, PathSegment::Key(real_key.clone()));
                    let new_value =
                        self.merge_with(merged.get(&real_key), value, local, &child_path)?;
                    merged.insert(real_key, new_value);
                }
                return Ok(ConfigValue::from_node(
                    Node::Mapping(merged),
                    current.origin().map(PathBuf::from),
                    current.labels().map(str::to_string).collect(),
                ));
            }
        }

        if let Some(current) = current {
            if strategy == MergeStrategy::Keep && !current.is_empty() {
                return Ok(current.clone());
            }
        }

        let element_strategy = if strategy == MergeStrategy::IgnoreInherit {
            MergeStrategy::IgnoreInherit
        } else {
            MergeStrategy::Default
        };

        if let (Some(Node::Sequence(current_items)), Node::Sequence(added_items)) =
            (current.map(ConfigValue::value), added.value())
        {
            let start = match strategy {
                MergeStrategy::Append => current_items.len(),
                _ => 0,
            };
            let new_added = added_items
                .iter()
                .enumerate()
                .map(|(index, value)| {
                    let child_path = child_keypath(keypath, PathSegment::Index(start + index));
                    self.merge_with(None, value, element_strategy, &child_path)
                })
                .collect::<Result<Vec<_>, _>>()?;

            let combined = match strategy {
                MergeStrategy::Prepend => new_added
                    .into_iter()
                    .chain(current_items.iter().cloned())
                    .collect(),
                MergeStrategy::Append => current_items
                    .iter()
                    .cloned()
                    .chain(new_added)
                    .collect(),
                _ => new_added,
            };
            return Ok(container(Node::Sequence(dedupe(combined)), added));
        }

        match added.value() {
            Node::Mapping(added_map) => {
                let mut map = ConfigMap::new();
                for (key, value) in added_map.iter() {
                    let (real_key, local) = self.key_strategy.resolve(key, keypath, strategy)?;
                    let child_path = child_keypath(keypath, PathSegment::Key(real_key.clone()));
                    map.insert(real_key, self.merge_with(None, value, local, &child_path)?);
                }
                Ok(container(Node::Mapping(map), added))
            }
            Node::Sequence(added_items) => {
                let items = added_items
                    .iter()
                    .enumerate()
                    .map(|(index, value)| {
                        let child_path = child_keypath(keypath, PathSegment::Index(index));
                        self.merge_with(None, value, element_strategy, &child_path)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(container(Node::Sequence(items), added))
            }
            _ => match self.transform {
                Some(transform) => transform.transform(added.clone(), keypath),
                None => Ok(added.clone()),
            },
        }
    }
}

/// Merge `added` on top of `current` with the built-in key directives and
/// no transform.
pub fn merge(current: &ConfigValue, added: &ConfigValue) -> Result<ConfigValue, ConfigError> {
    Merger::default().merge(Some(current), added)
}

fn child_keypath(keypath: &[PathSegment], segment: PathSegment) -> Vec<PathSegment> {
    let mut path = Vec::with_capacity(keypath.len() + 1);
    path.extend_from_slice(keypath);
    path.push(segment);
    path
}

/// New container built by the merge. It carries no labels of its own (its
/// children do) and takes the origin of its last child that has one.
fn container(value: Node, added: &ConfigValue) -> ConfigValue {
    let inherited = match &value {
        Node::Sequence(items) => items.iter().rev().find_map(ConfigValue::origin),
        Node::Mapping(map) => map
            .iter()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .find_map(|(_, child)| child.origin()),
        _ => None,
    };
    let origin = inherited.or_else(|| added.origin()).map(PathBuf::from);
    ConfigValue::from_node(value, origin, BTreeSet::new())
}

/// Drop later duplicates, comparing values only.
fn dedupe(items: Vec<ConfigValue>) -> Vec<ConfigValue> {
    let mut unique: Vec<ConfigValue> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.iter().any(|seen| seen.same_value(&item)) {
            unique.push(item);
        }
    }
    unique
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod tests;
