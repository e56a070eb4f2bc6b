//! Provenance-carrying configuration tree.
//!
//! Every node of a loaded configuration is a [`ConfigValue`]: the value
//! itself plus the file it was read from and a set of provenance labels
//! (e.g. `git_repo`). Children of sequences and mappings are themselves
//! `ConfigValue`s, so provenance survives merges down to each leaf.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};
use serde_yaml::{Mapping, Number, Value};

/// One step of a key path: a mapping key or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Render a key path as `a.b.0.c` for diagnostics.
pub fn display_keypath(keypath: &[PathSegment]) -> String {
    keypath
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// String-keyed mapping that keeps insertion order and unique keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigMap {
    entries: Vec<(String, ConfigValue)>,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ConfigValue> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: ConfigValue) {
        let key = key.into();
        match self.get_mut(&key) {
            Some(slot) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl FromIterator<(String, ConfigValue)> for ConfigMap {
    fn from_iter<I: IntoIterator<Item = (String, ConfigValue)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

/// The payload of a [`ConfigValue`].
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Sequence(Vec<ConfigValue>),
    Mapping(ConfigMap),
}

impl Node {
    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
        }
    }
}

/// A configuration value together with its provenance.
///
/// `Clone` produces a fully independent deep copy, origin and labels
/// included.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValue {
    value: Node,
    origin: Option<PathBuf>,
    labels: BTreeSet<String>,
}

impl Default for ConfigValue {
    fn default() -> Self {
        Self::empty_map()
    }
}

impl ConfigValue {
    /// Recursively wrap a plain YAML value.
    ///
    /// Every nested node receives the same `origin` and `labels`. YAML
    /// tags are dropped and non-string mapping keys are stringified.
    pub fn wrap(raw: &Value, origin: Option<&Path>, labels: &[&str]) -> Self {
        let labels: BTreeSet<String> = labels.iter().map(|l| l.to_string()).collect();
        Self::wrap_with(raw, origin, &labels)
    }

    /// Wrap a plain value with no origin and no labels.
    pub fn from_plain(raw: &Value) -> Self {
        Self::wrap(raw, None, &[])
    }

    pub fn empty_map() -> Self {
        Self::from_node(Node::Mapping(ConfigMap::new()), None, BTreeSet::new())
    }

    pub(crate) fn from_node(
        value: Node,
        origin: Option<PathBuf>,
        labels: BTreeSet<String>,
    ) -> Self {
        Self {
            value,
            origin,
            labels,
        }
    }

    fn wrap_with(raw: &Value, origin: Option<&Path>, labels: &BTreeSet<String>) -> Self {
        let value = match raw {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(*b),
            Value::Number(n) => Node::Number(n.clone()),
            Value::String(s) => Node::String(s.clone()),
            Value::Sequence(items) => Node::Sequence(
                items
                    .iter()
                    .map(|item| Self::wrap_with(item, origin, labels))
                    .collect(),
            ),
            Value::Mapping(map) => Node::Mapping(
                map.iter()
                    .map(|(k, v)| (key_to_string(k), Self::wrap_with(v, origin, labels)))
                    .collect(),
            ),
            Value::Tagged(tagged) => return Self::wrap_with(&tagged.value, origin, labels),
        };
        Self::from_node(value, origin.map(Path::to_path_buf), labels.clone())
    }

    pub fn value(&self) -> &Node {
        &self.value
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Union `labels` into this node's own label set. Children are untouched.
    pub fn add_labels(&mut self, labels: &[&str]) {
        self.labels.extend(labels.iter().map(|l| l.to_string()));
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, Node::Null)
    }

    /// Null, the empty string, and empty collections count as empty.
    /// `false` and `0` do not.
    pub fn is_empty(&self) -> bool {
        match &self.value {
            Node::Null => true,
            Node::String(s) => s.is_empty(),
            Node::Sequence(items) => items.is_empty(),
            Node::Mapping(map) => map.is_empty(),
            Node::Bool(_) | Node::Number(_) => false,
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self.value, Node::Mapping(_))
    }

    pub fn as_map(&self) -> Option<&ConfigMap> {
        match &self.value {
            Node::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ConfigValue]> {
        match &self.value {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.value.kind()
    }

    /// Replace this node's value with a freshly wrapped `raw`.
    ///
    /// The node keeps its labels; the new children inherit this node's
    /// origin and carry no labels.
    pub fn set(&mut self, raw: &Value) {
        self.value = Self::wrap_with(raw, self.origin.as_deref(), &BTreeSet::new()).value;
    }

    /// Replace this node's value with an already wrapped value.
    ///
    /// Provenance is inherited from `value` when it has an origin.
    pub fn set_node(&mut self, value: ConfigValue) {
        if value.origin.is_some() {
            self.origin = value.origin;
        }
        self.value = value.value;
    }

    /// Assign `raw` under `key`. A non-mapping node becomes a mapping.
    pub fn insert(&mut self, key: impl Into<String>, raw: &Value) {
        let child = Self::wrap_with(raw, self.origin.as_deref(), &BTreeSet::new());
        self.insert_node(key, child);
    }

    /// Assign an already wrapped value under `key`, keeping its provenance.
    pub fn insert_node(&mut self, key: impl Into<String>, child: ConfigValue) {
        if !self.is_map() {
            self.value = Node::Mapping(ConfigMap::new());
        }
        if let Node::Mapping(map) = &mut self.value {
            map.insert(key, child);
        }
    }

    /// Walk down `keypath` through mappings (by key) and sequences (by
    /// numeric index).
    pub fn get(&self, keypath: &[&str]) -> Option<&ConfigValue> {
        let mut current = self;
        for segment in keypath {
            current = match &current.value {
                Node::Mapping(map) => map.get(segment)?,
                Node::Sequence(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn get_mut(&mut self, keypath: &[&str]) -> Option<&mut ConfigValue> {
        let mut current = self;
        for segment in keypath {
            current = match &mut current.value {
                Node::Mapping(map) => map.get_mut(segment)?,
                Node::Sequence(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Keep only the leaves carrying `label`.
    ///
    /// Containers survive when at least one descendant survives; `None`
    /// when nothing matches.
    pub fn select_label(&self, label: &str) -> Option<ConfigValue> {
        match &self.value {
            Node::Mapping(map) => {
                let selected: ConfigMap = map
                    .iter()
                    .filter_map(|(k, v)| v.select_label(label).map(|v| (k.to_string(), v)))
                    .collect();
                if selected.is_empty() {
                    return None;
                }
                Some(self.with_node(Node::Mapping(selected)))
            }
            Node::Sequence(items) => {
                let selected: Vec<ConfigValue> =
                    items.iter().filter_map(|v| v.select_label(label)).collect();
                if selected.is_empty() {
                    return None;
                }
                Some(self.with_node(Node::Sequence(selected)))
            }
            _ if self.has_label(label) => Some(self.clone()),
            _ => None,
        }
    }

    /// Drop every subtree carrying `label`.
    ///
    /// Containers left empty are dropped too; `None` when nothing remains.
    pub fn reject_label(&self, label: &str) -> Option<ConfigValue> {
        if self.has_label(label) {
            return None;
        }
        match &self.value {
            Node::Mapping(map) => {
                let kept: ConfigMap = map
                    .iter()
                    .filter_map(|(k, v)| v.reject_label(label).map(|v| (k.to_string(), v)))
                    .collect();
                if kept.is_empty() {
                    return None;
                }
                Some(self.with_node(Node::Mapping(kept)))
            }
            Node::Sequence(items) => {
                let kept: Vec<ConfigValue> =
                    items.iter().filter_map(|v| v.reject_label(label)).collect();
                if kept.is_empty() {
                    return None;
                }
                Some(self.with_node(Node::Sequence(kept)))
            }
            _ => Some(self.clone()),
        }
    }

    fn with_node(&self, value: Node) -> ConfigValue {
        Self::from_node(value, self.origin.clone(), self.labels.clone())
    }

    /// Iterate over every leaf with the key path leading to it.
    ///
    /// Empty containers have no leaves and yield nothing.
    pub fn flatten(&self) -> Flatten<'_> {
        Flatten {
            stack: vec![(Vec::new(), self)],
        }
    }

    /// Strip all provenance, producing a plain YAML value of the same shape.
    pub fn to_plain(&self) -> Value {
        match &self.value {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Number(n) => Value::Number(n.clone()),
            Node::String(s) => Value::String(s.clone()),
            Node::Sequence(items) => Value::Sequence(items.iter().map(Self::to_plain).collect()),
            Node::Mapping(map) => {
                let mut plain = Mapping::new();
                for (key, value) in map.iter() {
                    plain.insert(Value::String(key.to_string()), value.to_plain());
                }
                Value::Mapping(plain)
            }
        }
    }

    /// Independent copy, provenance included.
    pub fn deep_dup(&self) -> Self {
        self.clone()
    }

    /// Structural equality on values only, ignoring origin and labels.
    pub fn same_value(&self, other: &ConfigValue) -> bool {
        match (&self.value, &other.value) {
            (Node::Sequence(a), Node::Sequence(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_value(y))
            }
            (Node::Mapping(a), Node::Mapping(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|other| v.same_value(other)))
            }
            (a, b) => a == b,
        }
    }
}

impl Serialize for ConfigValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_plain().serialize(serializer)
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Node::Null => Ok(()),
            Node::Bool(b) => write!(f, "{b}"),
            Node::Number(n) => write!(f, "{n}"),
            Node::String(s) => write!(f, "{s}"),
            _ => match serde_yaml::to_string(&self.to_plain()) {
                Ok(yaml) => write!(f, "{}", yaml.trim_end()),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

/// Depth-first, in-order iterator over the leaves of a [`ConfigValue`].
pub struct Flatten<'a> {
    stack: Vec<(Vec<PathSegment>, &'a ConfigValue)>,
}

impl<'a> Iterator for Flatten<'a> {
    type Item = (Vec<PathSegment>, &'a ConfigValue);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((keypath, node)) = self.stack.pop() {
            match &node.value {
                Node::Mapping(map) => {
                    let children: Vec<_> = map.iter().collect();
                    for (key, child) in children.into_iter().rev() {
                        let mut path = keypath.clone();
                        path.push(PathSegment::Key(key.to_string()));
                        self.stack.push((path, child));
                    }
                }
                Node::Sequence(items) => {
                    for (index, child) in items.iter().enumerate().rev() {
                        let mut path = keypath.clone();
                        path.push(PathSegment::Index(index));
                        self.stack.push((path, child));
                    }
                }
                _ => return Some((keypath, node)),
            }
        }
        None
    }
}

fn key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "~".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
#[path = "value_tests.rs"]
pub(crate) mod tests;
