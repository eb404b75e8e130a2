use serde_json::{Map, Value};

/// Normalises an operator payload into the store's conventional form.
///
/// Object keys are lowercased recursively; arrays and scalars pass through
/// unchanged. Payloads are schemaless by design, so callers reading a
/// record back must expect this normalised shape rather than their
/// original field casing.
#[must_use]
pub fn normalize_custom_data(value: Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut normalized = Map::with_capacity(fields.len());
            for (key, field) in fields {
                normalized.insert(key.to_lowercase(), normalize_custom_data(field));
            }
            Value::Object(normalized)
        }
        Value::Array(items) => {
            Value::Array(items.into_iter().map(normalize_custom_data).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::normalize_custom_data;

    #[test]
    fn lowercases_keys_recursively() {
        let normalized = normalize_custom_data(json!({
            "A": "value",
            "Nested": {"InnerKey": 1},
            "List": [{"X": true}, 2, "Y"],
        }));
        assert_eq!(
            normalized,
            json!({
                "a": "value",
                "nested": {"innerkey": 1},
                "list": [{"x": true}, 2, "Y"],
            })
        );
    }

    #[test]
    fn leaves_scalars_untouched() {
        assert_eq!(normalize_custom_data(json!("Value")), json!("Value"));
        assert_eq!(normalize_custom_data(json!(42)), json!(42));
        assert_eq!(normalize_custom_data(json!(null)), json!(null));
    }
}
