use anyhow::Result;
use serde_yaml::Value;

use omni_config::ConfigValue;
use omni_core::types::OutputFormat;

use crate::repo::load_store;

pub(crate) fn handle_config_show(cd: Option<String>, format: OutputFormat) -> Result<()> {
    let store = load_store(cd.as_deref())?;
    let config = store.plain();

    match format {
        OutputFormat::Json => {
            let json_str = serde_json::to_string_pretty(&config)?;
            println!("{}", json_str);
        }
        OutputFormat::Text => {
            let yaml_str = serde_yaml::to_string(&config)?;
            print!("{}", yaml_str);
        }
    }
    Ok(())
}

pub(crate) fn handle_config_path(
    cd: Option<String>,
    no_local: bool,
    format: OutputFormat,
) -> Result<()> {
    let store = load_store(cd.as_deref())?;
    let paths = store.effective_path(!no_local);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&paths)?),
        OutputFormat::Text => {
            for path in paths {
                println!("{path}");
            }
        }
    }
    Ok(())
}

pub(crate) fn handle_config_org(cd: Option<String>, format: OutputFormat) -> Result<()> {
    let store = load_store(cd.as_deref())?;
    let orgs = store.effective_orgs();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&orgs)?),
        OutputFormat::Text => {
            for org in &orgs {
                println!("{}", format_org(org)?);
            }
        }
    }
    Ok(())
}

pub(crate) fn handle_config_files(cd: Option<String>, format: OutputFormat) -> Result<()> {
    let store = load_store(cd.as_deref())?;
    let files = store.loaded_files();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(files)?),
        OutputFormat::Text => {
            for file in files {
                println!("{}", file.display());
            }
        }
    }
    Ok(())
}

/// Get a merged config value by dotted key path.
///
/// Sequence elements are addressed by index (e.g. `path.append.0`).
pub(crate) fn handle_config_get(
    key: String,
    default: Option<String>,
    cd: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let store = load_store(cd.as_deref())?;
    let keypath = split_key(&key);

    match (store.node(&keypath), default) {
        (Some(value), _) => {
            println!("{}", format_value(value, &format)?);
            Ok(())
        }
        (None, Some(d)) => {
            println!("{d}");
            Ok(())
        }
        (None, None) => anyhow::bail!("Key not found: {key}"),
    }
}

fn split_key(key: &str) -> Vec<&str> {
    key.split('.').filter(|part| !part.is_empty()).collect()
}

/// Scalars inline, containers as YAML (or JSON with `--format json`).
fn format_value(value: &ConfigValue, format: &OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Text => value.to_string(),
    })
}

/// Organizations are printed as their handle when they have one.
fn format_org(org: &Value) -> Result<String> {
    Ok(match org {
        Value::String(s) => s.clone(),
        Value::Mapping(_) => match org.get("handle").and_then(Value::as_str) {
            Some(handle) => handle.to_string(),
            None => serde_json::to_string(org)?,
        },
        other => serde_json::to_string(other)?,
    })
}
