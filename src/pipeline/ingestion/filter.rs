//! Column filters applied to records before they reach a transform.

use serde::Deserialize;
use serde_json::Value;

use crate::types::{as_f64, scalar_to_string, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Inclusion {
    Include,
    Exclude,
}

/// Comparison applied by a filter, selected by `filter_code`.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterRule {
    Gt(f64),
    Ge(f64),
    Lt(f64),
    Le(f64),
    Eq(Value),
    Ne(Value),
    /// Exact member, or any listed value occurring inside a string value
    In(Vec<Value>),
    InExact(Vec<Value>),
}

/// A filter on one column.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawColumnFilter")]
pub struct ColumnFilter {
    pub column: String,
    pub inclusion: Inclusion,
    pub rule: FilterRule,
}

#[derive(Deserialize)]
struct RawColumnFilter {
    column: String,
    inclusion: Inclusion,
    filter_code: String,
    value: Value,
}

impl TryFrom<RawColumnFilter> for ColumnFilter {
    type Error = String;

    fn try_from(raw: RawColumnFilter) -> Result<Self, Self::Error> {
        let bound = || {
            raw.value
                .as_f64()
                .ok_or_else(|| format!("filter '{}' needs a numeric value", raw.filter_code))
        };
        let list = || match &raw.value {
            Value::Array(items) => Ok(items.clone()),
            _ => Err(format!("filter '{}' needs a list value", raw.filter_code)),
        };
        let rule = match raw.filter_code.as_str() {
            "gt" => FilterRule::Gt(bound()?),
            "ge" | "gte" => FilterRule::Ge(bound()?),
            "lt" => FilterRule::Lt(bound()?),
            "le" | "lte" => FilterRule::Le(bound()?),
            "eq" => FilterRule::Eq(raw.value.clone()),
            "ne" => FilterRule::Ne(raw.value.clone()),
            "in" => FilterRule::In(list()?),
            "in_exact" => FilterRule::InExact(list()?),
            other => return Err(format!("no such operator for filter code '{other}'")),
        };
        Ok(Self {
            column: raw.column,
            inclusion: raw.inclusion,
            rule,
        })
    }
}

impl ColumnFilter {
    pub fn include(column: impl Into<String>, rule: FilterRule) -> Self {
        Self {
            column: column.into(),
            inclusion: Inclusion::Include,
            rule,
        }
    }

    pub fn exclude(column: impl Into<String>, rule: FilterRule) -> Self {
        Self {
            column: column.into(),
            inclusion: Inclusion::Exclude,
            rule,
        }
    }
}

/// All filters of a source; a row is kept only when every filter keeps it.
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    filters: Vec<ColumnFilter>,
}

impl RowFilter {
    pub fn new(filters: Vec<ColumnFilter>) -> Self {
        Self { filters }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn include_row(&self, row: &Record) -> bool {
        self.filters.iter().all(|filter| {
            // A missing value cannot satisfy any comparison
            let value = match row.get(&filter.column) {
                None | Some(Value::Null) => return false,
                Some(value) => value,
            };
            let matched = filter.rule.matches(value);
            match filter.inclusion {
                Inclusion::Include => matched,
                Inclusion::Exclude => !matched,
            }
        })
    }
}

impl FilterRule {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FilterRule::Gt(bound) => as_f64(value).is_some_and(|v| v > *bound),
            FilterRule::Ge(bound) => as_f64(value).is_some_and(|v| v >= *bound),
            FilterRule::Lt(bound) => as_f64(value).is_some_and(|v| v < *bound),
            FilterRule::Le(bound) => as_f64(value).is_some_and(|v| v <= *bound),
            FilterRule::Eq(expected) => values_equal(value, expected),
            FilterRule::Ne(expected) => !values_equal(value, expected),
            FilterRule::InExact(options) => options.iter().any(|o| values_equal(value, o)),
            FilterRule::In(options) => {
                if options.iter().any(|o| values_equal(value, o)) {
                    return true;
                }
                match value {
                    Value::String(text) => options
                        .iter()
                        .any(|o| text.contains(scalar_to_string(o).as_str())),
                    _ => false,
                }
            }
        }
    }
}

/// Numbers compare numerically (so "7" equals 7), anything else by text.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (as_f64(left), as_f64(right)) {
        (Some(l), Some(r)) if left.is_number() || right.is_number() => l == r,
        _ => scalar_to_string(left) == scalar_to_string(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn numeric_comparisons_accept_numeric_strings() {
        let filter = RowFilter::new(vec![ColumnFilter::include("score", FilterRule::Ge(0.5))]);
        assert!(filter.include_row(&row(json!({"score": "0.7"}))));
        assert!(filter.include_row(&row(json!({"score": 0.5}))));
        assert!(!filter.include_row(&row(json!({"score": "0.1"}))));
        assert!(!filter.include_row(&row(json!({"score": "n/a"}))));
    }

    #[test]
    fn missing_or_null_column_excludes_the_row() {
        let filter = RowFilter::new(vec![ColumnFilter::exclude(
            "taxon",
            FilterRule::Eq(json!("9606")),
        )]);
        assert!(!filter.include_row(&row(json!({"other": 1}))));
        assert!(!filter.include_row(&row(json!({"taxon": null}))));
        assert!(filter.include_row(&row(json!({"taxon": "10090"}))));
        assert!(!filter.include_row(&row(json!({"taxon": 9606}))));
    }

    #[test]
    fn in_matches_substrings_but_in_exact_does_not() {
        let options = vec![json!("abc"), json!("def")];
        assert!(FilterRule::In(options.clone()).matches(&json!("abcde")));
        assert!(!FilterRule::InExact(options.clone()).matches(&json!("abcde")));
        assert!(FilterRule::InExact(options).matches(&json!("def")));
    }

    #[test]
    fn filters_deserialize_by_filter_code() {
        let filter: ColumnFilter = serde_yaml::from_str(
            "column: evidence\ninclusion: include\nfilter_code: in\nvalue: [IDA, IMP]\n",
        )
        .unwrap();
        assert_eq!(
            filter.rule,
            FilterRule::In(vec![json!("IDA"), json!("IMP")])
        );
        let filter: ColumnFilter =
            serde_yaml::from_str("column: score\ninclusion: exclude\nfilter_code: lte\nvalue: 3\n")
                .unwrap();
        assert_eq!(filter.rule, FilterRule::Le(3.0));
    }
}
