use anyhow::Result;
use serde_yaml::Value;
use std::io::{BufRead, IsTerminal, Write};

use omni_config::{ConfigStore, OperationRegistry, PathUpdate, accept_repo_paths, run_operations};
use omni_core::types::{HandlePath, UpDirection};

use crate::custom_op::CustomOperation;

pub(crate) fn registry() -> OperationRegistry {
    let mut registry = OperationRegistry::new();
    registry.register("custom", CustomOperation::build);
    registry
}

pub(crate) fn handle_up(
    direction: UpDirection,
    handle_path: HandlePath,
    cd: Option<String>,
) -> Result<()> {
    let store = crate::repo::load_store(cd.as_deref())?;
    let Some(repo_root) = store.env().repo_root.clone() else {
        anyhow::bail!("can only be run from a git repository");
    };

    let up = store.up();
    let should_handle_path = direction == UpDirection::Up
        && handle_path.is_enabled()
        && !store.repo_only_path().is_empty();

    if up.is_none() && !should_handle_path {
        eprintln!("omni: {direction}: No up configuration found, nothing to do.");
        return Ok(());
    }

    if let Some(up) = up {
        let operations = registry().build(&up)?;
        run_operations(&operations, direction, &repo_root)?;
    }

    if should_handle_path {
        handle_repo_paths(&store, direction, handle_path == HandlePath::Yes)?;
    }
    Ok(())
}

fn handle_repo_paths(store: &ConfigStore, direction: UpDirection, proceed: bool) -> Result<()> {
    let outcome = accept_repo_paths(store, |previous, merged| {
        eprintln!("omni: {direction}: The current repository is declaring paths for omni commands.");
        eprintln!("omni: {direction}: The following paths are going to be set in your configuration:");
        print_indented_path(&Value::Mapping(merged.clone()));
        if let Some(previous) = previous.filter(|p| has_path_lists(p)) {
            eprintln!("omni: {direction}: Previous configuration contained:");
            print_indented_path(previous);
        }
        proceed || confirm("Do you want to continue?")
    })?;

    match outcome {
        PathUpdate::Accepted(_) => eprintln!("omni: {direction}: Handled path."),
        PathUpdate::Declined => eprintln!("omni: {direction}: Skipped handling path."),
        PathUpdate::Unchanged => {}
    }
    Ok(())
}

fn has_path_lists(path: &Value) -> bool {
    path.get("append").is_some() || path.get("prepend").is_some()
}

fn print_indented_path(path: &Value) {
    eprintln!("  path:");
    for line in render_yaml(path).lines() {
        eprintln!("    {line}");
    }
}

fn render_yaml(value: &Value) -> String {
    serde_yaml::to_string(value).unwrap_or_else(|_| format!("{value:?}\n"))
}

/// Ask a yes/no question on stderr. Anything but an explicit yes, or a
/// non-interactive stdin, counts as no.
fn confirm(question: &str) -> bool {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        return false;
    }
    eprint!("{question} [y/N] ");
    if std::io::stderr().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match stdin.lock().read_line(&mut answer) {
        Ok(_) => is_yes(&answer),
        Err(_) => false,
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
