//! Loading prediction files, extracted files, judge results and judge test data

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use serde_json::Value;

use super::{value_to_text, ExtractedRecord, PredictionRecord};

/// Error type for data loading
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing field: {0}")]
    MissingField(String),
}

impl LoadError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Read a file that must hold a top-level JSON array
fn read_json_array(path: &Path) -> Result<Vec<Value>, LoadError> {
    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&content)? {
        Value::Array(items) => Ok(items),
        other => Err(LoadError::Parse(format!(
            "expected a JSON array in {}, found {}",
            path.display(),
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Load raw prediction records.
///
/// Elements that do not fit the record shape are kept with only their `id`
/// so the extraction stage counts them as invalid instead of failing the file.
pub fn load_prediction_records(path: impl AsRef<Path>) -> Result<Vec<PredictionRecord>, LoadError> {
    let items = read_json_array(path.as_ref())?;

    Ok(items
        .into_iter()
        .map(|item| match serde_json::from_value::<PredictionRecord>(item.clone()) {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!("Malformed prediction record ({}), keeping id only", e);
                PredictionRecord {
                    id: item.get("id").cloned(),
                    ..Default::default()
                }
            }
        })
        .collect())
}

/// Load extracted records for scoring.
///
/// `gold` and `answer` are required on every element; `extraction_success`
/// defaults to true when absent. Elements without an `id` are skipped.
pub fn load_extracted_records(path: impl AsRef<Path>) -> Result<Vec<ExtractedRecord>, LoadError> {
    let path = path.as_ref();
    let items = read_json_array(path)?;
    let mut records = Vec::with_capacity(items.len());

    for (idx, item) in items.iter().enumerate() {
        let Some(id) = item.get("id").and_then(value_to_text) else {
            tracing::warn!("Skipping item {} without id in {}", idx, path.display());
            continue;
        };
        let gold = item
            .get("gold")
            .and_then(value_to_text)
            .ok_or_else(|| LoadError::MissingField(format!("gold (item {})", idx)))?;
        let answer = item
            .get("answer")
            .and_then(value_to_text)
            .ok_or_else(|| LoadError::MissingField(format!("answer (item {})", idx)))?;

        records.push(ExtractedRecord {
            id,
            gold,
            pred: item.get("pred").and_then(value_to_text).unwrap_or_default(),
            answer,
            extraction_success: item
                .get("extraction_success")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            category: item
                .get("category")
                .and_then(Value::as_str)
                .map(String::from),
        });
    }

    Ok(records)
}

/// Load `id -> final_score` from a judge-results store file.
///
/// Records without an id or without a numeric `final_score` are ignored.
pub fn load_judge_scores(path: impl AsRef<Path>) -> Result<IndexMap<String, f64>, LoadError> {
    let items = read_json_array(path.as_ref())?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let id = item.get("id").and_then(value_to_text)?;
            let score = item.get("final_score").and_then(Value::as_f64)?;
            Some((id, score))
        })
        .collect())
}

/// Question and reference answer of one judge test item
#[derive(Debug, Clone, PartialEq)]
pub struct TestItem {
    pub question: String,
    pub answer: String,
}

/// Load judge test data keyed by `id`, falling back to `query_id`
pub fn load_test_items(path: impl AsRef<Path>) -> Result<HashMap<String, TestItem>, LoadError> {
    let items = read_json_array(path.as_ref())?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let id = item
                .get("id")
                .and_then(value_to_text)
                .filter(|s| !s.is_empty())
                .or_else(|| item.get("query_id").and_then(value_to_text))
                .filter(|s| !s.is_empty())?;
            let text = |key: &str| item.get(key).and_then(value_to_text).unwrap_or_default();
            Some((
                id,
                TestItem {
                    question: text("question"),
                    answer: text("answer"),
                },
            ))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_prediction_records_keeps_malformed_items() {
        let file = write_temp(r#"[
            {"id": "1", "gold": "A", "pred": "答案是A"},
            {"id": "2", "gold": "B", "pred": 42},
            {"gold": "C", "pred": "C"}
        ]"#);

        let records = load_prediction_records(file.path()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].gold_string().as_deref(), Some("A"));
        // pred of the wrong type keeps only the id
        assert_eq!(records[1].id_string().as_deref(), Some("2"));
        assert!(records[1].gold.is_none());
        assert!(records[2].id.is_none());
    }

    #[test]
    fn test_load_prediction_records_rejects_non_array() {
        let file = write_temp(r#"{"id": "1"}"#);
        let err = load_prediction_records(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::Parse(_)));
    }

    #[test]
    fn test_load_extracted_records_defaults() {
        let file = write_temp(r#"[
            {"id": 1, "gold": 3, "answer": "3.0"},
            {"id": "2", "gold": "AB", "answer": "none", "extraction_success": false, "category": "隐私"}
        ]"#);

        let records = load_extracted_records(file.path()).unwrap();
        assert_eq!(records[0].id, "1");
        assert_eq!(records[0].gold, "3");
        assert!(records[0].extraction_success);
        assert!(!records[1].extraction_success);
        assert_eq!(records[1].category.as_deref(), Some("隐私"));
    }

    #[test]
    fn test_load_extracted_records_skips_missing_id() {
        let file = write_temp(r#"[
            {"gold": "A", "answer": "A"},
            {"id": "2", "gold": "B", "answer": "C"},
            {"id": null, "gold": "C", "answer": "C"}
        ]"#);

        let records = load_extracted_records(file.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "2");
    }

    #[test]
    fn test_load_extracted_records_missing_answer() {
        let file = write_temp(r#"[{"id": "1", "gold": "A"}]"#);
        let err = load_extracted_records(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::MissingField(_)));
    }

    #[test]
    fn test_load_judge_scores_skips_null_scores() {
        let file = write_temp(r#"[
            {"id": "a", "final_score": 4.5},
            {"id": "b", "final_score": null},
            {"final_score": 3}
        ]"#);

        let scores = load_judge_scores(file.path()).unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores.get("a"), Some(&4.5));
    }

    #[test]
    fn test_load_test_items_query_id_fallback() {
        let file = write_temp(r#"[
            {"id": "x1", "question": "q1", "answer": "a1"},
            {"query_id": "x2", "question": "q2", "answer": "a2"},
            {"question": "orphan"}
        ]"#);

        let items = load_test_items(file.path()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items["x2"].answer, "a2");
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = load_judge_scores("/nonexistent/bo_evaluation.json").unwrap_err();
        assert!(err.is_not_found());
    }
}
