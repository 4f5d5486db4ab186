use crate::error::{IngestError, Result};
use crate::types::TableDescriptor;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::warn;

/// The list of tables to ingest, in manifest order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub tables: Vec<TableDescriptor>,
}

impl Manifest {
    /// Read `{ "tables": [ ... ] }` from a JSON file.
    ///
    /// A missing `tables` key is an empty manifest. A document that is not an
    /// object, or `tables` that is not an array of descriptor objects, is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let manifest_err = |message: String| IngestError::Manifest {
            path: path.display().to_string(),
            message,
        };

        let content = fs::read_to_string(path).map_err(|e| manifest_err(e.to_string()))?;
        let document: Value = serde_json::from_str(&content).map_err(|e| manifest_err(e.to_string()))?;
        if !document.is_object() {
            return Err(manifest_err("manifest should be a JSON object".to_string()));
        }

        let tables = match document.get("tables") {
            None => {
                warn!("No 'tables' key in manifest {}", path.display());
                return Ok(Self::default());
            }
            Some(Value::Array(entries)) => entries,
            Some(_) => return Err(manifest_err("'tables' should be a list".to_string())),
        };

        let tables = tables
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                if !entry.is_object() {
                    return Err(manifest_err(format!("entry {} is not an object: {}", i, entry)));
                }
                serde_json::from_value(entry.clone())
                    .map_err(|e| manifest_err(format!("entry {}: {}", i, e)))
            })
            .collect::<Result<Vec<TableDescriptor>>>()?;

        Ok(Self { tables })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FilterValue;
    use serde_json::json;
    use tempfile::tempdir;

    fn write(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("tables.json");
        fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_load_manifest_in_order() {
        let (_tmp, path) = write(
            r#"{"tables": [
                {"table_name": "83625NED"},
                {"table_name": "37296ned", "filter_column": "Perioden", "filter_value": ["2020JJ00"]},
                {"filter_column": "RegioS"}
            ]}"#,
        );
        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.tables.len(), 3);
        assert_eq!(manifest.tables[0].name(), Some("83625NED"));
        assert_eq!(
            manifest.tables[1].filter_value,
            Some(FilterValue::Many(vec![json!("2020JJ00")]))
        );
        assert_eq!(manifest.tables[2].name(), None);
    }

    #[test]
    fn test_missing_tables_key_is_empty() {
        let (_tmp, path) = write(r#"{"other": 1}"#);
        assert!(Manifest::load(&path).unwrap().tables.is_empty());
    }

    #[test]
    fn test_malformed_manifests_are_errors() {
        for content in [
            "not json",
            r#"[{"table_name": "83625NED"}]"#,
            r#""83625NED""#,
            "42",
            "null",
            r#"{"tables": {"table_name": "x"}}"#,
            r#"{"tables": ["83625NED"]}"#,
            r#"{"tables": [{"table_name": 42}]}"#,
        ] {
            let (_tmp, path) = write(content);
            assert!(
                matches!(Manifest::load(&path), Err(IngestError::Manifest { .. })),
                "expected manifest error for {}",
                content
            );
        }
    }

    #[test]
    fn test_missing_file_is_error() {
        let tmp = tempdir().unwrap();
        assert!(matches!(
            Manifest::load(&tmp.path().join("absent.json")),
            Err(IngestError::Manifest { .. })
        ));
    }
}
