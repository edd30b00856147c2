//! YAML merge policies for preset inheritance.

use serde_yaml::{Mapping, Value};

/// Rule lists that accumulate across inheritance instead of replacing.
const CONCAT_RULE_LISTS: [&str; 2] = ["always_notify", "always_ignore"];

/// Deep-merge two YAML values: maps merge key by key, child wins everywhere
/// else (scalars and sequences replace).
pub fn deep_merge(parent: &Value, child: &Value) -> Value {
    match (parent, child) {
        (Value::Mapping(pm), Value::Mapping(cm)) => {
            let mut merged = pm.clone();
            for (key, child_val) in cm {
                let value = match pm.get(key) {
                    Some(parent_val) => deep_merge(parent_val, child_val),
                    None => child_val.clone(),
                };
                merged.insert(key.clone(), value);
            }
            Value::Mapping(merged)
        }
        (_, child) => child.clone(),
    }
}

/// Merge a preset onto its base.
///
/// Like [`deep_merge`] except: `thresholds` is replaced wholesale,
/// `rules.always_notify` / `rules.always_ignore` concatenate without
/// duplicates, and the child's `base` key is dropped.
pub fn merge_preset(base: &Value, child: &Value) -> Value {
    let (Value::Mapping(bm), Value::Mapping(cm)) = (base, child) else {
        return child.clone();
    };

    let mut merged = bm.clone();
    for (key, child_val) in cm {
        match key.as_str() {
            Some("base") => {}
            Some("thresholds") => {
                merged.insert(key.clone(), child_val.clone());
            }
            Some("rules") => {
                let value = match bm.get(key) {
                    Some(parent_rules) => merge_rules(parent_rules, child_val),
                    None => child_val.clone(),
                };
                merged.insert(key.clone(), value);
            }
            _ => {
                let value = match bm.get(key) {
                    Some(parent_val) => deep_merge(parent_val, child_val),
                    None => child_val.clone(),
                };
                merged.insert(key.clone(), value);
            }
        }
    }
    merged.remove("base");
    Value::Mapping(merged)
}

fn merge_rules(parent: &Value, child: &Value) -> Value {
    let (Value::Mapping(pm), Value::Mapping(cm)) = (parent, child) else {
        return child.clone();
    };
    let mut merged: Mapping = pm.clone();
    for (key, child_val) in cm {
        let concat = key.as_str().is_some_and(|k| CONCAT_RULE_LISTS.contains(&k));
        let value = match (pm.get(key), concat) {
            (Some(Value::Sequence(ps)), true) => {
                let mut items = ps.clone();
                if let Value::Sequence(cs) = child_val {
                    for item in cs {
                        if !items.contains(item) {
                            items.push(item.clone());
                        }
                    }
                }
                Value::Sequence(items)
            }
            (Some(parent_val), false) => deep_merge(parent_val, child_val),
            _ => child_val.clone(),
        };
        merged.insert(key.clone(), value);
    }
    Value::Mapping(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn maps_merge_scalars_and_lists_replace() {
        let parent = yaml("a: {x: 1, y: 2}\nlist: [1, 2]\nkeep: true");
        let child = yaml("a: {y: 3}\nlist: [9]");
        let merged = deep_merge(&parent, &child);
        assert_eq!(merged, yaml("a: {x: 1, y: 3}\nlist: [9]\nkeep: true"));
    }

    #[test]
    fn preset_policy() {
        let base = yaml(
            "weights: {location: 1.0, value: 1.0}
thresholds: {digest: 0.3, notify: 0.5, priority: 0.8}
rules: {always_notify: [high_value], always_ignore: [npc_only], require_any: [location]}",
        );
        let child = yaml(
            "base: balanced
weights: {value: 0.5}
thresholds: {notify: 0.4}
rules: {always_notify: [gatecamp, high_value], require_any: [activity]}",
        );
        let merged = merge_preset(&base, &child);
        assert_eq!(
            merged,
            yaml(
                "weights: {location: 1.0, value: 0.5}
thresholds: {notify: 0.4}
rules: {always_notify: [high_value, gatecamp], always_ignore: [npc_only], require_any: [activity]}"
            )
        );
    }
}
