//! `$alias` and `$alias.field` references inside step values.

use std::sync::LazyLock;

use regex::Captures;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::Value;

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$(\w+)(?:\.(\w+))?").unwrap());

static WHOLE_VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$(\w+)(?:\.(\w+))?$").unwrap());

/// A reference found in a value: the alias without `$`, and the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRef {
    pub name: String,
    pub field: Option<String>,
}

/// Every variable reference inside `value`, depth first.
#[must_use]
pub fn variable_refs(value: &Value) -> Vec<VariableRef> {
    let mut refs = Vec::new();
    collect(value, &mut refs);
    refs
}

pub(crate) fn collect(value: &Value, out: &mut Vec<VariableRef>) {
    match value {
        Value::String(text) => {
            for captures in VARIABLE.captures_iter(text) {
                out.push(VariableRef {
                    name: captures[1].to_string(),
                    field: captures.get(2).map(|m| m.as_str().to_string()),
                });
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect(item, out)),
        _ => {}
    }
}

/// Rewrite references after aliases changed.
///
/// `renames` maps old names (without `$`) to their new name, or to `None`
/// when the step is gone. A value that is exactly a reference to a removed
/// step becomes `null`.
pub(crate) fn remap(value: &mut Value, renames: &FxHashMap<String, Option<String>>) {
    let removed = value.as_str().is_some_and(|text| {
        WHOLE_VARIABLE
            .captures(text)
            .is_some_and(|captures| matches!(renames.get(&captures[1]), Some(None)))
    });
    if removed {
        *value = Value::Null;
        return;
    }

    match value {
        Value::String(text) => {
            let replaced = VARIABLE.replace_all(text, |captures: &Captures<'_>| {
                match renames.get(&captures[1]) {
                    Some(Some(new_name)) => match captures.get(2) {
                        Some(field) => format!("${new_name}.{}", field.as_str()),
                        None => format!("${new_name}"),
                    },
                    _ => captures[0].to_string(),
                }
            });
            if replaced != text.as_str() {
                *text = replaced.into_owned();
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| remap(item, renames)),
        Value::Object(map) => map.values_mut().for_each(|item| remap(item, renames)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_collect_finds_embedded_references() {
        let mut refs = Vec::new();
        collect(
            &json!({"a": "$person1.id", "b": ["x $property2 y"], "c": 3}),
            &mut refs,
        );
        assert_eq!(
            refs,
            [
                VariableRef {
                    name: "person1".to_string(),
                    field: Some("id".to_string())
                },
                VariableRef {
                    name: "property2".to_string(),
                    field: None
                },
            ]
        );
    }

    #[test]
    fn test_remap_swaps_simultaneously() {
        let renames = FxHashMap::from_iter([
            ("person1".to_string(), Some("person2".to_string())),
            ("person2".to_string(), Some("person1".to_string())),
        ]);
        let mut value = json!({"a": "$person1.id", "b": "$person2.id"});
        remap(&mut value, &renames);
        assert_eq!(value, json!({"a": "$person2.id", "b": "$person1.id"}));
    }

    #[test]
    fn test_remap_nulls_removed_steps() {
        let renames = FxHashMap::from_iter([("person1".to_string(), None)]);
        let mut value = json!({"owner_id": "$person1.id", "note": "by $person1"});
        remap(&mut value, &renames);
        assert_eq!(value, json!({"owner_id": null, "note": "by $person1"}));
    }
}
