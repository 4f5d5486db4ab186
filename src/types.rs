use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// One manifest entry: a remote table and its optional row filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub filter_column: Option<String>,
    #[serde(default)]
    pub filter_value: Option<FilterValue>,
}

impl TableDescriptor {
    pub fn new(table_name: &str) -> Self {
        Self {
            table_name: Some(table_name.to_string()),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, column: &str, value: FilterValue) -> Self {
        self.filter_column = Some(column.to_string());
        self.filter_value = Some(value);
        self
    }

    /// Table name, treating an empty string as missing
    pub fn name(&self) -> Option<&str> {
        self.table_name.as_deref().filter(|n| !n.is_empty())
    }

    /// Filter column and target set, only when both are present and non-empty
    pub fn filter(&self) -> Option<(&str, BTreeSet<String>)> {
        let column = self.filter_column.as_deref().filter(|c| !c.is_empty())?;
        let value = self.filter_value.as_ref().filter(|v| !v.is_empty())?;
        Some((column, value.targets()))
    }
}

/// Filter target: a single scalar or a list of scalars
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Many(Vec<Value>),
    One(Value),
}

impl FilterValue {
    /// Falsy values disable the filter: null, `""`, `[]`, `0` and `false`
    pub fn is_empty(&self) -> bool {
        match self {
            FilterValue::Many(values) => values.is_empty(),
            FilterValue::One(Value::Null) => true,
            FilterValue::One(Value::String(s)) => s.is_empty(),
            FilterValue::One(Value::Bool(b)) => !b,
            FilterValue::One(Value::Number(n)) => n.as_f64() == Some(0.0),
            FilterValue::One(_) => false,
        }
    }

    /// Target values in string form; a scalar becomes a singleton set.
    /// Targets are not trimmed, only the column values are.
    pub fn targets(&self) -> BTreeSet<String> {
        match self {
            FilterValue::Many(values) => values.iter().filter_map(scalar_to_string).collect(),
            FilterValue::One(value) => scalar_to_string(value).into_iter().collect(),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Many(values) => write!(f, "{}", Value::Array(values.clone())),
            FilterValue::One(value) => write!(f, "{}", value),
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Serialization format of the output artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Parquet,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Parquet => "parquet",
            OutputFormat::Csv => "csv",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "parquet" => Ok(OutputFormat::Parquet),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(IngestError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// What the batch does when a table fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure and keep processing the remaining tables
    #[default]
    Continue,
    /// Cancel outstanding tables at the first failure
    Abort,
}

/// Result of processing one manifest entry
#[derive(Debug, Clone, PartialEq)]
pub enum TableOutcome {
    Written {
        table: String,
        path: PathBuf,
        rows: usize,
    },
    Skipped {
        reason: String,
    },
    Failed {
        table: String,
        error: String,
    },
}

impl TableOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TableOutcome::Written { .. } => "written",
            TableOutcome::Skipped { .. } => "skipped",
            TableOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TableOutcome::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_deserializes_scalar_and_list_filters() {
        let scalar: TableDescriptor = serde_json::from_value(json!({
            "table_name": "83625NED",
            "filter_column": "RegioS",
            "filter_value": "NL01"
        }))
        .unwrap();
        assert_eq!(scalar.filter_value, Some(FilterValue::One(json!("NL01"))));

        let list: TableDescriptor = serde_json::from_value(json!({
            "table_name": "83625NED",
            "filter_column": "Perioden",
            "filter_value": ["2020JJ00", 2021]
        }))
        .unwrap();
        let (column, targets) = list.filter().unwrap();
        assert_eq!(column, "Perioden");
        assert!(targets.contains("2020JJ00"));
        assert!(targets.contains("2021"));
    }

    #[test]
    fn test_descriptor_missing_fields_default_to_none() {
        let d: TableDescriptor = serde_json::from_value(json!({})).unwrap();
        assert_eq!(d.name(), None);
        assert!(d.filter().is_none());

        let empty_name = TableDescriptor::new("");
        assert_eq!(empty_name.name(), None);
    }

    #[test]
    fn test_empty_filter_values_disable_filtering() {
        for value in [json!(""), json!([]), json!(null), json!(0), json!(0.0), json!(false)] {
            let d = TableDescriptor {
                table_name: Some("t".into()),
                filter_column: Some("c".into()),
                filter_value: serde_json::from_value(value).unwrap(),
            };
            assert!(d.filter().is_none());
        }

        let no_column = TableDescriptor::new("t");
        assert!(no_column.filter().is_none());
    }

    #[test]
    fn test_truthy_scalar_filter_values_filter() {
        for (value, target) in [(json!(2020), "2020"), (json!(true), "true"), (json!([0]), "0")] {
            let d = TableDescriptor::new("t").with_filter("c", serde_json::from_value(value).unwrap());
            let (_, targets) = d.filter().unwrap();
            assert!(targets.contains(target));
        }
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("parquet".parse::<OutputFormat>().unwrap(), OutputFormat::Parquet);
        assert_eq!("csv".parse::<OutputFormat>().unwrap().extension(), "csv");
        assert!(matches!(
            "xlsx".parse::<OutputFormat>(),
            Err(IngestError::UnsupportedFormat(f)) if f == "xlsx"
        ));
    }
}
