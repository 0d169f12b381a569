use serde_json::Value;

/// One logical row of a source: field name to scalar or list-of-scalar value,
/// in source column order.
pub type Record = serde_json::Map<String, Value>;

/// Values the writers and validators treat as absent.
pub fn is_null_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.iter().all(is_null_value),
        _ => false,
    }
}

/// Render a scalar value the way it appears in a delimited file.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Iterate the scalar members of a value: each element of a list, or the value itself.
pub fn scalars(value: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    match value {
        Value::Array(items) => Box::new(items.iter().filter(|v| !is_null_value(v))),
        Value::Null => Box::new(std::iter::empty()),
        other => Box::new(std::iter::once(other)),
    }
}

/// The prefix part of a `prefix:reference` identifier, or the whole string when
/// it has no colon.
pub fn curie_prefix(id: &str) -> &str {
    id.split(':').next().unwrap_or(id)
}

/// Interpret a value as a number, accepting numeric strings.
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_strings_and_empty_lists_are_null() {
        assert!(is_null_value(&json!(null)));
        assert!(is_null_value(&json!(" ")));
        assert!(is_null_value(&json!([])));
        assert!(is_null_value(&json!(["", null])));
        assert!(!is_null_value(&json!("HGNC:1")));
        assert!(!is_null_value(&json!(0)));
    }

    #[test]
    fn scalars_flattens_lists() {
        let value = json!(["a", "", "b"]);
        let collected: Vec<String> = scalars(&value).map(scalar_to_string).collect();
        assert_eq!(collected, vec!["a", "b"]);
        assert_eq!(scalars(&json!("x")).count(), 1);
    }

    #[test]
    fn prefix_of_curie() {
        assert_eq!(curie_prefix("HGNC:1100"), "HGNC");
        assert_eq!(curie_prefix("nocolon"), "nocolon");
    }

    #[test]
    fn numeric_strings_are_numbers() {
        assert_eq!(as_f64(&json!("0.5")), Some(0.5));
        assert_eq!(as_f64(&json!(3)), Some(3.0));
        assert_eq!(as_f64(&json!("abc")), None);
    }
}
