//! Pruning of absent values from nested configuration.
//!
//! A `null` in caller configuration means "no override". Sending it to the
//! runtime verbatim would overwrite a daemon default with an explicit empty
//! value, so it is removed before anything leaves the process.

use serde_json::{Map, Value};

/// Return a copy of `config` with every `null` value removed.
///
/// Objects are pruned recursively and dropped when nothing is left in them.
/// Arrays and scalars are passed through untouched; a `null` inside an array
/// is kept as-is.
pub fn prune(config: &Map<String, Value>) -> Map<String, Value> {
    let mut pruned = Map::new();

    for (key, value) in config {
        match value {
            Value::Null => {}
            Value::Object(nested) => {
                let nested = prune(nested);
                if !nested.is_empty() {
                    pruned.insert(key.clone(), Value::Object(nested));
                }
            }
            other => {
                pruned.insert(key.clone(), other.clone());
            }
        }
    }

    pruned
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_prune_drops_nulls_and_emptied_objects() {
        let config = object(json!({"a": 1, "b": null, "c": {"d": null}}));
        assert_eq!(prune(&config), object(json!({"a": 1})));
    }

    #[test]
    fn test_prune_keeps_non_empty_nested_objects() {
        let config = object(json!({
            "HostConfig": {"Memory": 536870912, "CapAdd": null, "Inner": {"x": null, "y": "z"}}
        }));
        assert_eq!(
            prune(&config),
            object(json!({"HostConfig": {"Memory": 536870912, "Inner": {"y": "z"}}}))
        );
    }

    #[test]
    fn test_prune_does_not_recurse_into_arrays() {
        let config = object(json!({"list": [1, null, {"k": null}], "empty": {}}));
        assert_eq!(
            prune(&config),
            object(json!({"list": [1, null, {"k": null}]}))
        );
    }

    #[test]
    fn test_prune_keeps_falsy_scalars() {
        let config = object(json!({"flag": false, "zero": 0, "blank": ""}));
        assert_eq!(prune(&config), config);
    }
}
