use super::*;
use crate::value::display_keypath;
use proptest::prelude::*;
use serde_yaml::Value;
use std::path::Path;

fn yaml(s: &str) -> Value {
    serde_yaml::from_str(s).unwrap()
}

fn plain(s: &str) -> ConfigValue {
    ConfigValue::from_plain(&yaml(s))
}

fn merged(current: &str, added: &str) -> Value {
    merge(&plain(current), &plain(added)).unwrap().to_plain()
}

fn dedupe_plain(items: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        (0i64..20).prop_map(|n| Value::Number(n.into())),
        "[a-z]{1,4}".prop_map(Value::String),
    ]
}

fn arb_map() -> impl Strategy<Value = Value> {
    crate::value::tests::arb_plain().prop_map(|value| {
        let mut map = serde_yaml::Mapping::new();
        map.insert(Value::String("root".into()), value);
        Value::Mapping(map)
    })
}

// ---------------------------------------------------------------------------
// Key directives
// ---------------------------------------------------------------------------

#[test]
fn test_resolve_suffix_directives() {
    let cases = [
        ("list__toappend", "list", MergeStrategy::Append),
        ("list__toprepend", "list", MergeStrategy::Prepend),
        ("list__toreplace", "list", MergeStrategy::Default),
        ("name__ifnone", "name", MergeStrategy::Keep),
    ];
    for (key, expected_key, expected_strategy) in cases {
        let (real, strategy) = resolve_key_strategy(key, &[], MergeStrategy::Default).unwrap();
        assert_eq!(real, expected_key, "key for {key}");
        assert_eq!(strategy, expected_strategy, "strategy for {key}");
    }
}

#[test]
fn test_resolve_unknown_suffix_is_literal_key() {
    let (real, strategy) =
        resolve_key_strategy("list__tomerge", &[], MergeStrategy::Default).unwrap();
    assert_eq!(real, "list__tomerge");
    assert_eq!(strategy, MergeStrategy::Default);
}

#[test]
fn test_resolve_path_append_prepend() {
    let keypath = vec![PathSegment::from("path")];
    assert_eq!(
        resolve_key_strategy("append", &keypath, MergeStrategy::Default).unwrap(),
        ("append".to_string(), MergeStrategy::Append)
    );
    assert_eq!(
        resolve_key_strategy("prepend", &keypath, MergeStrategy::Default).unwrap(),
        ("prepend".to_string(), MergeStrategy::Prepend)
    );

    // Only directly under the root `path` key.
    let nested = vec![PathSegment::from("env"), PathSegment::from("path")];
    assert_eq!(
        resolve_key_strategy("append", &nested, MergeStrategy::Default).unwrap(),
        ("append".to_string(), MergeStrategy::Default)
    );
}

#[test]
fn test_resolve_suggest_config_only_at_root() {
    assert_eq!(
        resolve_key_strategy("suggest_config", &[], MergeStrategy::Default).unwrap(),
        ("suggest_config".to_string(), MergeStrategy::IgnoreInherit)
    );
    let nested = vec![PathSegment::from("env")];
    assert_eq!(
        resolve_key_strategy("suggest_config", &nested, MergeStrategy::Default)
            .unwrap()
            .1,
        MergeStrategy::Default
    );
}

#[test]
fn test_resolve_ignore_inherit_keeps_keys_literal() {
    let keypath = vec![PathSegment::from("suggest_config")];
    assert_eq!(
        resolve_key_strategy("list__toappend", &keypath, MergeStrategy::IgnoreInherit).unwrap(),
        ("list__toappend".to_string(), MergeStrategy::IgnoreInherit)
    );
}

#[test]
fn test_resolve_falls_back_to_inherited() {
    assert_eq!(
        resolve_key_strategy("plain", &[], MergeStrategy::Keep).unwrap(),
        ("plain".to_string(), MergeStrategy::Keep)
    );
}

#[test]
fn test_strategy_parsing() {
    assert_eq!("append".parse::<MergeStrategy>().unwrap(), MergeStrategy::Append);
    assert_eq!(
        "ignore_inherit".parse::<MergeStrategy>().unwrap(),
        MergeStrategy::IgnoreInherit
    );
    let err = "merge".parse::<MergeStrategy>().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidStrategy(ref s) if s == "merge"));
    assert!(MergeStrategy::from_suffix("toboth").is_err());
    assert_eq!(MergeStrategy::Keep.to_string(), "keep");
}

// ---------------------------------------------------------------------------
// Decision table
// ---------------------------------------------------------------------------

#[test]
fn test_map_merge_keeps_current_only_keys() {
    assert_eq!(
        merged("a: 1\nb: {c: 2, d: 3}\n", "b: {c: 20}\ne: 5\n"),
        yaml("a: 1\nb: {c: 20, d: 3}\ne: 5\n")
    );
}

#[test]
fn test_default_sequences_replace_and_dedupe() {
    assert_eq!(merged("list: [1, 2]", "list: [3, 3, 4]"), yaml("list: [3, 4]"));
}

#[test]
fn test_append_directive() {
    assert_eq!(
        merged("list: [1, 2]", "list__toappend: [2, 3]"),
        yaml("list: [1, 2, 3]")
    );
}

#[test]
fn test_prepend_directive() {
    assert_eq!(
        merged("list: [1, 2]", "list__toprepend: [3, 1]"),
        yaml("list: [3, 1, 2]")
    );
}

#[test]
fn test_replace_directive() {
    assert_eq!(
        merged("list: [1, 2]", "list__toreplace: [9]"),
        yaml("list: [9]")
    );
}

#[test]
fn test_keep_directive_scalar() {
    assert_eq!(merged("name: old", "name__ifnone: new"), yaml("name: old"));
    assert_eq!(merged("other: 1", "name__ifnone: new"), yaml("other: 1\nname: new"));
    assert_eq!(merged("name: ~", "name__ifnone: new"), yaml("name: new"));
    assert_eq!(merged("name: ''", "name__ifnone: new"), yaml("name: new"));
}

#[test]
fn test_keep_directive_treats_false_and_zero_as_present() {
    assert_eq!(merged("flag: false", "flag__ifnone: true"), yaml("flag: false"));
    assert_eq!(merged("count: 0", "count__ifnone: 5"), yaml("count: 0"));
}

#[test]
fn test_keep_directive_sequences() {
    assert_eq!(merged("list: [1]", "list__ifnone: [2]"), yaml("list: [1]"));
    assert_eq!(merged("list: []", "list__ifnone: [2]"), yaml("list: [2]"));
}

#[test]
fn test_keep_directive_on_map_is_inherited_by_children() {
    assert_eq!(
        merged("m: {a: 1, b: ~}", "m__ifnone: {a: 10, b: 20, c: 30}"),
        yaml("m: {a: 1, b: 20, c: 30}")
    );
}

#[test]
fn test_append_directive_inherited_into_nested_maps() {
    assert_eq!(
        merged("m: {l: [1]}", "m__toappend: {l: [2]}"),
        yaml("m: {l: [1, 2]}")
    );
}

#[test]
fn test_sequence_elements_reset_to_default() {
    // The directive applies to the list, not to keys inside its elements.
    assert_eq!(
        merged("list: [{a: [1]}]", "list__toappend: [{a: [2]}]"),
        yaml("list: [{a: [1]}, {a: [2]}]")
    );
}

#[test]
fn test_new_map_has_directives_resolved() {
    assert_eq!(
        merged("{}", "m: {l__toappend: [1], n__ifnone: x}"),
        yaml("m: {l: [1], n: x}")
    );
}

#[test]
fn test_scalar_replaced_by_map_resolves_directives() {
    assert_eq!(
        merged("m: text", "m: {l__toappend: [1]}"),
        yaml("m: {l: [1]}")
    );
}

#[test]
fn test_new_sequence_is_not_deduplicated() {
    assert_eq!(merged("{}", "list: [1, 1]"), yaml("list: [1, 1]"));
}

#[test]
fn test_type_mismatch_added_wins() {
    assert_eq!(merged("a: [1, 2]", "a: 3"), yaml("a: 3"));
    assert_eq!(merged("a: {b: 1}", "a: [1]"), yaml("a: [1]"));
    assert_eq!(merged("a: 1", "a: ~"), yaml("a: ~"));
}

#[test]
fn test_suggest_config_passes_through_untouched() {
    assert_eq!(
        merged(
            "suggest_config: {a: [1]}",
            "suggest_config: {a__toappend: [2], b: {c__ifnone: 1}}"
        ),
        yaml("suggest_config: {a: [1], a__toappend: [2], b: {c__ifnone: 1}}")
    );
}

#[test]
fn test_ignore_inherit_sequences_replace() {
    assert_eq!(
        merged("suggest_config: {l: [1, 2]}", "suggest_config: {l: [3]}"),
        yaml("suggest_config: {l: [3]}")
    );
}

#[test]
fn test_path_keys_use_their_own_strategy() {
    assert_eq!(
        merged(
            "path: {append: [a], prepend: [b]}",
            "path: {append: [c], prepend: [d]}"
        ),
        yaml("path: {append: [a, c], prepend: [d, b]}")
    );
}

// ---------------------------------------------------------------------------
// Provenance
// ---------------------------------------------------------------------------

#[test]
fn test_merge_preserves_leaf_provenance() {
    let current = ConfigValue::wrap(&yaml("list: [a]"), Some(Path::new("/user")), &[]);
    let added = ConfigValue::wrap(
        &yaml("list__toappend: [b]"),
        Some(Path::new("/repo")),
        &["git_repo"],
    );
    let result = merge(&current, &added).unwrap();

    let first = result.get(&["list", "0"]).unwrap();
    assert_eq!(first.origin(), Some(Path::new("/user")));
    assert!(!first.has_label("git_repo"));

    let second = result.get(&["list", "1"]).unwrap();
    assert_eq!(second.origin(), Some(Path::new("/repo")));
    assert!(second.has_label("git_repo"));

    // The merged list container inherits the origin of its last element
    // and carries no labels itself.
    let list = result.get(&["list"]).unwrap();
    assert_eq!(list.origin(), Some(Path::new("/repo")));
    assert!(!list.has_label("git_repo"));
}

#[test]
fn test_merge_keeps_current_map_provenance() {
    let current = ConfigValue::wrap(&yaml("env: {A: 1}"), Some(Path::new("/user")), &["mine"]);
    let added = ConfigValue::wrap(&yaml("env: {B: 2}"), Some(Path::new("/repo")), &[]);
    let result = merge(&current, &added).unwrap();
    let env = result.get(&["env"]).unwrap();
    assert_eq!(env.origin(), Some(Path::new("/user")));
    assert!(env.has_label("mine"));
}

#[test]
fn test_merge_is_pure() {
    let current = plain("list: [1]\nm: {a: 1}\n");
    let added = plain("list__toappend: [2]\nm: {b: 2}\n");
    let current_before = current.clone();
    let added_before = added.clone();

    let _ = merge(&current, &added).unwrap();

    assert_eq!(current, current_before);
    assert_eq!(added, added_before);
}

#[test]
fn test_merge_is_deterministic() {
    let current = plain("z: 1\na: [3, 1]\nm: {y: 1, x: 2}\n");
    let added = plain("a__toprepend: [2, 3]\nm: {w: 0}\nb: true\n");
    let first = serde_yaml::to_string(&merge(&current, &added).unwrap()).unwrap();
    let second = serde_yaml::to_string(&merge(&current, &added).unwrap()).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first,
        "z: 1\na:\n- 2\n- 3\n- 1\nm:\n  y: 1\n  x: 2\n  w: 0\nb: true\n"
    );
}

// ---------------------------------------------------------------------------
// Injected hooks
// ---------------------------------------------------------------------------

#[test]
fn test_transform_receives_leaf_keypaths() {
    let seen = std::cell::RefCell::new(Vec::new());
    let transform = |value: ConfigValue, keypath: &[PathSegment]| -> Result<ConfigValue, ConfigError> {
        seen.borrow_mut().push(display_keypath(keypath));
        Ok(value)
    };
    let merger = Merger::new().with_transform(&transform);
    let current = plain("path: {append: [a]}");
    let added = plain("path: {append: [b, c]}\nname: x\n");
    merger.merge(Some(&current), &added).unwrap();

    assert_eq!(
        seen.into_inner(),
        vec!["path.append.1", "path.append.2", "name"]
    );
}

#[test]
fn test_transform_can_rewrite_values() {
    let upper = |mut value: ConfigValue, _: &[PathSegment]| -> Result<ConfigValue, ConfigError> {
        if let Some(s) = value.as_str().map(str::to_uppercase) {
            value.set(&Value::String(s));
        }
        Ok(value)
    };
    let merger = Merger::new().with_transform(&upper);
    let result = merger.merge(None, &plain("a: [x]\nb: y\n")).unwrap();
    assert_eq!(result.to_plain(), yaml("a: [X]\nb: Y\n"));
}

#[test]
fn test_transform_errors_propagate() {
    let failing = |_: ConfigValue, _: &[PathSegment]| -> Result<ConfigValue, ConfigError> {
        Err(ConfigError::InvalidStrategy("boom".into()))
    };
    let merger = Merger::new().with_transform(&failing);
    assert!(merger.merge(None, &plain("a: 1")).is_err());
}

#[test]
fn test_custom_key_strategy() {
    // Treat every `*_list` key as an append target.
    let custom = |key: &str, keypath: &[PathSegment], inherited: MergeStrategy| {
        if key.ends_with("_list") {
            Ok((key.to_string(), MergeStrategy::Append))
        } else {
            resolve_key_strategy(key, keypath, inherited)
        }
    };
    let merger = Merger::new().with_key_strategy(&custom);
    let result = merger
        .merge(Some(&plain("tool_list: [a]\nother: [a]\n")), &plain("tool_list: [b]\nother: [b]\n"))
        .unwrap();
    assert_eq!(result.to_plain(), yaml("tool_list: [a, b]\nother: [b]\n"));
}

#[test]
fn test_key_strategy_errors_propagate() {
    let strict = |key: &str, _: &[PathSegment], _: MergeStrategy| {
        Err::<(String, MergeStrategy), _>(ConfigError::InvalidStrategy(key.to_string()))
    };
    let merger = Merger::new().with_key_strategy(&strict);
    let err = merger
        .merge(Some(&plain("a: 1")), &plain("a: 2"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidStrategy(ref k) if k == "a"));
}

// ---------------------------------------------------------------------------
// Algebraic properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_merge_into_empty_is_identity(raw in arb_map()) {
        let added = ConfigValue::from_plain(&raw);
        let result = merge(&ConfigValue::empty_map(), &added).unwrap();
        prop_assert_eq!(result.to_plain(), raw);
    }

    #[test]
    fn prop_merge_empty_into_value_is_identity(raw in arb_map()) {
        let current = ConfigValue::from_plain(&raw);
        let result = merge(&current, &ConfigValue::empty_map()).unwrap();
        prop_assert_eq!(result.to_plain(), raw);
    }

    #[test]
    fn prop_append_law(
        a in prop::collection::vec(arb_scalar(), 0..6),
        b in prop::collection::vec(arb_scalar(), 0..6),
    ) {
        let current = ConfigValue::from_plain(&yaml_map("list", Value::Sequence(a.clone())));
        let added = ConfigValue::from_plain(&yaml_map("list__toappend", Value::Sequence(b.clone())));
        let result = merge(&current, &added).unwrap();

        let expected = dedupe_plain(a.into_iter().chain(b).collect());
        prop_assert_eq!(result.get(&["list"]).unwrap().to_plain(), Value::Sequence(expected));
    }

    #[test]
    fn prop_prepend_law(
        a in prop::collection::vec(arb_scalar(), 0..6),
        b in prop::collection::vec(arb_scalar(), 0..6),
    ) {
        let current = ConfigValue::from_plain(&yaml_map("list", Value::Sequence(a.clone())));
        let added = ConfigValue::from_plain(&yaml_map("list__toprepend", Value::Sequence(b.clone())));
        let result = merge(&current, &added).unwrap();

        let expected = dedupe_plain(b.into_iter().chain(a).collect());
        prop_assert_eq!(result.get(&["list"]).unwrap().to_plain(), Value::Sequence(expected));
    }

    #[test]
    fn prop_keep_law(current_value in arb_scalar(), added_value in arb_scalar()) {
        prop_assume!(!ConfigValue::from_plain(&current_value).is_empty());
        let current = ConfigValue::from_plain(&yaml_map("key", current_value.clone()));
        let added = ConfigValue::from_plain(&yaml_map("key__ifnone", added_value));
        let result = merge(&current, &added).unwrap();
        prop_assert_eq!(result.get(&["key"]).unwrap().to_plain(), current_value);
    }

    #[test]
    fn prop_default_replace_law(current_value in arb_scalar(), added_value in arb_scalar()) {
        let current = ConfigValue::from_plain(&yaml_map("key", current_value));
        let added = ConfigValue::from_plain(&yaml_map("key", added_value.clone()));
        let result = merge(&current, &added).unwrap();
        prop_assert_eq!(result.get(&["key"]).unwrap().to_plain(), added_value);
    }
}

proptest! {
    #[test]
    fn prop_labels_partition_merged_leaves(user in arb_map(), repo in arb_map()) {
        let current = ConfigValue::wrap(&user, Some(Path::new("/home/u/.omni.yaml")), &[]);
        let added = ConfigValue::wrap(&repo, Some(Path::new("/repo/.omni.yaml")), &["git_repo"]);
        let merged = Merger::new().merge(Some(&current), &added).unwrap();

        let (labeled, unlabeled): (Vec<_>, Vec<_>) = merged
            .flatten()
            .partition(|(_, leaf)| leaf.has_label("git_repo"));

        let selected = merged.select_label("git_repo");
        let rejected = merged.reject_label("git_repo");
        prop_assert_eq!(leaves_of(selected.as_ref()), leaf_list(labeled));
        prop_assert_eq!(leaves_of(rejected.as_ref()), leaf_list(unlabeled));

        if let Some(rejected) = rejected {
            prop_assert!(rejected.select_label("git_repo").is_none());
        }
    }
}

/// Leaves as `(keypath, value)`. Sequence indices are masked since label
/// filtering compacts sequences.
fn leaf_list(leaves: Vec<(Vec<PathSegment>, &ConfigValue)>) -> Vec<(String, Value)> {
    leaves
        .into_iter()
        .map(|(keypath, leaf)| {
            let key = keypath
                .iter()
                .map(|segment| match segment {
                    PathSegment::Key(key) => key.clone(),
                    PathSegment::Index(_) => "#".to_string(),
                })
                .collect::<Vec<_>>()
                .join(".");
            (key, leaf.to_plain())
        })
        .collect()
}

fn leaves_of(value: Option<&ConfigValue>) -> Vec<(String, Value)> {
    value
        .map(|value| leaf_list(value.flatten().collect()))
        .unwrap_or_default()
}

#[test]
fn test_labels_partition_user_and_repo_contributions() {
    let current = ConfigValue::wrap(
        &yaml("path: {append: [/usr/bin]}\nenv: {A: 1}\n"),
        Some(Path::new("/home/u/.omni.yaml")),
        &[],
    );
    let added = ConfigValue::wrap(
        &yaml("path: {append: [/repo/bin]}\nenv: {B: 2}\n"),
        Some(Path::new("/repo/.omni.yaml")),
        &["git_repo"],
    );
    let merged = Merger::new().merge(Some(&current), &added).unwrap();

    let rejected = merged.reject_label("git_repo").unwrap();
    assert_eq!(
        rejected.to_plain(),
        yaml("path: {append: [/usr/bin]}\nenv: {A: 1}\n")
    );
    assert!(rejected.select_label("git_repo").is_none());

    let selected = merged.select_label("git_repo").unwrap();
    assert_eq!(
        selected.to_plain(),
        yaml("path: {append: [/repo/bin]}\nenv: {B: 2}\n")
    );
}

fn yaml_map(key: &str, value: Value) -> Value {
    let mut map = serde_yaml::Mapping::new();
    map.insert(Value::String(key.to_string()), value);
    Value::Mapping(map)
}
