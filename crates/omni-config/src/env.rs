//! Snapshot of the process environment the configuration depends on.

use std::path::{Path, PathBuf};

/// File names probed at the root of a repository, lowest precedence first.
pub const REPO_CONFIG_CANDIDATES: &[&str] = &[
    "dev.yml",
    ".omni",
    ".omni.yaml",
    ".omni/config",
    ".omni/config.yaml",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OmniEnv {
    pub home: Option<PathBuf>,
    pub xdg_config_home: Option<PathBuf>,
    pub xdg_cache_home: Option<PathBuf>,
    pub omni_config: Option<PathBuf>,
    pub omnipath: Vec<String>,
    pub omni_org: Vec<String>,
    pub repo_root: Option<PathBuf>,
}

impl OmniEnv {
    /// Environment rooted at `home` with no overrides and no repository.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            xdg_config_home: Some(home.join(".config")),
            xdg_cache_home: Some(home.join(".cache")),
            home: Some(home),
            omni_config: None,
            omnipath: Vec::new(),
            omni_org: Vec::new(),
            repo_root: None,
        }
    }

    /// Read the current process environment.
    pub fn from_process() -> Self {
        let fallback_home = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
        Self::from_lookup(|name| std::env::var(name).ok(), fallback_home)
    }

    /// Build from an arbitrary variable lookup. `fallback_home` is used
    /// when `HOME` is unset or empty.
    pub fn from_lookup<F>(lookup: F, fallback_home: Option<PathBuf>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let home = non_empty("HOME").map(PathBuf::from).or(fallback_home);
        let xdg_dir = |name: &str, default: &str| {
            non_empty(name)
                .map(PathBuf::from)
                .filter(|path| path.is_absolute())
                .or_else(|| home.as_ref().map(|home| home.join(default)))
        };

        Self {
            xdg_config_home: xdg_dir("XDG_CONFIG_HOME", ".config"),
            xdg_cache_home: xdg_dir("XDG_CACHE_HOME", ".cache"),
            omni_config: non_empty("OMNI_CONFIG").map(PathBuf::from),
            omnipath: non_empty("OMNIPATH")
                .map(|value| split_list(&value, ':'))
                .unwrap_or_default(),
            omni_org: non_empty("OMNI_ORG")
                .map(|value| split_list(&value, ','))
                .unwrap_or_default(),
            home,
            repo_root: None,
        }
    }

    pub fn with_repo_root(mut self, repo_root: Option<PathBuf>) -> Self {
        self.repo_root = repo_root;
        self
    }

    pub fn in_repo(&self) -> bool {
        self.repo_root.is_some()
    }

    /// User configuration files, lowest precedence first.
    pub fn config_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        if let Some(home) = &self.home {
            files.push(home.join(".omni"));
            files.push(home.join(".omni.yaml"));
        }
        if let Some(xdg) = &self.xdg_config_home {
            files.push(xdg.join("omni"));
            files.push(xdg.join("omni.yaml"));
        }
        if let Some(extra) = &self.omni_config {
            files.push(extra.clone());
        }
        files
    }

    /// Repository-local configuration files, lowest precedence first.
    /// Empty outside a repository.
    pub fn repo_config_files(&self) -> Vec<PathBuf> {
        match &self.repo_root {
            Some(root) => REPO_CONFIG_CANDIDATES
                .iter()
                .map(|name| root.join(name))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Directory for omni's cache, under the XDG cache home.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.xdg_cache_home.as_deref().map(|dir| dir.join("omni"))
    }

    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }
}

fn split_list(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
