//! # Diff
//!
//! Compact JSON diffs for logging what a pass changed.

use serde::Serialize;
use serde_json::Value;

/// Changed paths between two values, as `path: old -> new` entries joined by `; `
///
/// Values that fail to serialize compare as `null`.
pub fn json_diff<T: Serialize + ?Sized>(before: &T, after: &T) -> String {
    let before = serde_json::to_value(before).unwrap_or(Value::Null);
    let after = serde_json::to_value(after).unwrap_or(Value::Null);
    let mut changes = Vec::new();
    collect("", &before, &after, &mut changes);
    changes.join("; ")
}

fn collect(path: &str, before: &Value, after: &Value, out: &mut Vec<String>) {
    if before == after {
        return;
    }
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            let mut keys: Vec<&String> = b.keys().chain(a.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let child = format!("{path}/{key}");
                match (b.get(key), a.get(key)) {
                    (Some(old), Some(new)) => collect(&child, old, new, out),
                    (Some(old), None) => out.push(format!("-{child}: {old}")),
                    (None, Some(new)) => out.push(format!("+{child}: {new}")),
                    (None, None) => {}
                }
            }
        }
        (Value::Array(b), Value::Array(a)) if b.len() == a.len() => {
            for (i, (old, new)) in b.iter().zip(a).enumerate() {
                collect(&format!("{path}/{i}"), old, new, out);
            }
        }
        _ => {
            let path = if path.is_empty() { "/" } else { path };
            out.push(format!("{path}: {before} -> {after}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equal_values_have_no_diff() {
        let value = json!({"a": [1, 2], "b": {"c": "d"}});
        assert_eq!(json_diff(&value, &value), "");
    }

    #[test]
    fn test_nested_change_reports_path() {
        let before = json!({"status": {"latestImage": "a"}});
        let after = json!({"status": {"latestImage": "b"}});
        assert_eq!(
            json_diff(&before, &after),
            r#"/status/latestImage: "a" -> "b""#
        );
    }

    #[test]
    fn test_added_and_removed_keys() {
        let before = json!({"gone": 1});
        let after = json!({"new": 2});
        assert_eq!(json_diff(&before, &after), "-/gone: 1; +/new: 2");
    }

    #[test]
    fn test_resized_array_is_replaced_whole() {
        let before = json!({"ports": [80]});
        let after = json!({"ports": [80, 443]});
        assert_eq!(json_diff(&before, &after), "/ports: [80] -> [80,443]");
    }
}
