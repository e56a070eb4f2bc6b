//! Built-in configuration defaults.

use omni_core::ConfigError;
use serde_yaml::Value;

use crate::env::OmniEnv;
use crate::value::ConfigValue;

const DEFAULTS_YAML: &str = r#"
cache: {}
commands: {}
command_match_skip_prompt_if:
  first_min: 0.80
  second_max: 0.60
config_commands:
  split_on_dash: true
  split_on_slash: true
env: {}
makefile_commands:
  enabled: true
  split_on_dash: true
  split_on_slash: true
org: []
path:
  append: []
  prepend: []
path_repo_updates:
  enabled: true
  interval: 43200
  ref_type: branch
  ref_match: null
  per_repo_config: {}
repo_path_format: "%{host}/%{org}/%{repo}"
"#;

/// The default tree, with no origin and no labels. `cache.path` points at
/// the omni directory under the XDG cache home when one is known.
pub fn load_defaults(env: &OmniEnv) -> Result<ConfigValue, ConfigError> {
    let raw: Value = serde_yaml::from_str(DEFAULTS_YAML).map_err(|e| ConfigError::Parse {
        path: "<defaults>".into(),
        message: e.to_string(),
    })?;

    let mut defaults = ConfigValue::from_plain(&raw);
    if let (Some(cache), Some(dir)) = (defaults.get_mut(&["cache"]), env.cache_dir()) {
        cache.insert("path", &Value::String(dir.to_string_lossy().into_owned()));
    }
    Ok(defaults)
}
