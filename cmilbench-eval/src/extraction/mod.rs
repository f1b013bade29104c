//! Answer extraction from raw model output

pub mod normalize;
pub mod strategies;

pub use normalize::{equal, normalize};
pub use strategies::{extract_choice_from_text, ChoiceStrategy, StrategyKind, CHOICE_STRATEGIES};

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::tasks::{
    load_prediction_records, AnswerKind, ExtractedRecord, LoadError, PredictionRecord, TaskId,
    TEXT_CATEGORIES,
};

/// Placeholder answer for failed choice, classification and numeric extraction
pub const NO_ANSWER: &str = "none";

static DECIMAL_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("Invalid number regex"));

/// Outcome of extracting one answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub answer: String,
    pub success: bool,
}

impl ExtractionResult {
    pub fn found(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            success: true,
        }
    }

    pub fn failed(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            success: false,
        }
    }
}

/// Extract an answer according to the task's answer kind
pub fn extract_answer(kind: AnswerKind, record: &PredictionRecord) -> ExtractionResult {
    match kind {
        AnswerKind::Choice => extract_choice(record),
        AnswerKind::FreeText => extract_free_text(record),
        AnswerKind::Classification => extract_classification(record),
        AnswerKind::Numeric => extract_numeric(record),
    }
}

/// `pred` first, then the structured response content
pub fn extract_choice(record: &PredictionRecord) -> ExtractionResult {
    std::iter::once(record.pred_text())
        .chain(record.structured_content())
        .find_map(extract_choice_from_text)
        .map(ExtractionResult::found)
        .unwrap_or_else(|| ExtractionResult::failed(NO_ANSWER))
}

/// Structured content wins over `pred`; empty text is a failure
pub fn extract_free_text(record: &PredictionRecord) -> ExtractionResult {
    if let Some(content) = record.structured_content().map(str::trim) {
        if !content.is_empty() {
            return ExtractionResult::found(content);
        }
    }

    let pred = record.pred_text().trim();
    if pred.is_empty() {
        ExtractionResult::failed("")
    } else {
        ExtractionResult::found(pred)
    }
}

/// First table category contained in `pred`; otherwise the latest table
/// category contained in the structured content
pub fn extract_classification(record: &PredictionRecord) -> ExtractionResult {
    let pred = record.pred_text();
    if let Some(category) = TEXT_CATEGORIES.iter().find(|c| pred.contains(*c)) {
        return ExtractionResult::found(*category);
    }

    if let Some(content) = record.structured_content().filter(|c| !c.is_empty()) {
        if let Some(category) = TEXT_CATEGORIES.iter().rev().find(|c| content.contains(*c)) {
            return ExtractionResult::found(*category);
        }
    }

    ExtractionResult::failed(NO_ANSWER)
}

/// First number in `pred`; otherwise the last number in the structured content
pub fn extract_numeric(record: &PredictionRecord) -> ExtractionResult {
    if let Some(m) = DECIMAL_NUMBER.find(record.pred_text()) {
        return ExtractionResult::found(m.as_str());
    }

    if let Some(m) = record
        .structured_content()
        .and_then(|content| DECIMAL_NUMBER.find_iter(content).last())
    {
        return ExtractionResult::found(m.as_str());
    }

    ExtractionResult::failed(NO_ANSWER)
}

/// Per-file extraction statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileStats {
    pub total_items: usize,
    pub invalid_items: usize,
    pub extraction_failed_items: usize,
    pub processed_items: usize,
    pub success_rate: f64,
    pub invalid_item_ids: Vec<String>,
    pub extraction_failed_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileStats {
    pub fn from_error(error: impl std::fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

/// Extract answers for every record of one file.
///
/// Records without `id` or `gold` are skipped and counted as invalid.
pub fn process_records(
    task: TaskId,
    records: &[PredictionRecord],
) -> (Vec<ExtractedRecord>, FileStats) {
    let kind = task.answer_kind();
    let mut stats = FileStats {
        total_items: records.len(),
        ..Default::default()
    };
    let mut extracted = Vec::with_capacity(records.len());

    for record in records {
        let id = record.id_string();
        let (id, gold) = match (id, record.gold_string()) {
            (Some(id), Some(gold)) => (id, gold),
            (id, _) => {
                stats.invalid_items += 1;
                if let Some(id) = id {
                    stats.invalid_item_ids.push(id);
                }
                continue;
            }
        };

        let result = extract_answer(kind, record);
        if !result.success {
            stats.extraction_failed_items += 1;
            stats.extraction_failed_ids.push(id.clone());
        }

        extracted.push(ExtractedRecord {
            id,
            gold,
            pred: record.pred_text().to_string(),
            answer: result.answer,
            extraction_success: result.success,
            category: record.category.clone(),
        });
    }

    stats.processed_items = extracted.len();
    stats.success_rate = if extracted.is_empty() {
        0.0
    } else {
        (stats.processed_items - stats.extraction_failed_items) as f64
            / stats.processed_items as f64
    };

    (extracted, stats)
}

/// Load and extract one prediction file
pub fn process_file(
    path: impl AsRef<Path>,
    task: TaskId,
) -> Result<(Vec<ExtractedRecord>, FileStats), LoadError> {
    let records = load_prediction_records(path)?;
    Ok(process_records(task, &records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> PredictionRecord {
        serde_json::from_value(value).unwrap()
    }

    fn with_content(pred: &str, content: &str) -> PredictionRecord {
        record(json!({
            "id": "1",
            "gold": "x",
            "pred": pred,
            "api_response": {"choices": [{"message": {"content": content}}]}
        }))
    }

    #[test]
    fn test_choice_falls_back_to_structured_content() {
        let r = with_content("无法判断", "经过分析，答案是D");
        assert_eq!(extract_choice(&r), ExtractionResult::found("D"));

        let r = with_content("", "");
        assert_eq!(extract_choice(&r), ExtractionResult::failed(NO_ANSWER));
    }

    #[test]
    fn test_free_text_prefers_structured_content() {
        let r = with_content("  pred text ", "  content text ");
        assert_eq!(extract_free_text(&r), ExtractionResult::found("content text"));

        let r = with_content("  pred text ", "   ");
        assert_eq!(extract_free_text(&r), ExtractionResult::found("pred text"));

        let r = record(json!({"id": "1", "gold": "x", "pred": "   "}));
        assert_eq!(extract_free_text(&r), ExtractionResult::failed(""));
    }

    #[test]
    fn test_classification_table_order() {
        // pred: first category in table order, not in text order
        let r = with_content("这是科技和体育新闻", "");
        assert_eq!(extract_classification(&r), ExtractionResult::found("体育"));

        // content: latest category in table order
        let r = with_content("不确定", "可能是体育，也可能是旅游");
        assert_eq!(extract_classification(&r), ExtractionResult::found("旅游"));

        let r = with_content("不确定", "无");
        assert!(!extract_classification(&r).success);
    }

    #[test]
    fn test_numeric_first_in_pred_last_in_content() {
        let r = with_content("结果为 12.5，而不是 13", "");
        assert_eq!(extract_numeric(&r), ExtractionResult::found("12.5"));

        let r = with_content("不知道", "先算 3 再算 7，最终 42");
        assert_eq!(extract_numeric(&r), ExtractionResult::found("42"));

        let r = with_content("不知道", "");
        assert_eq!(extract_numeric(&r), ExtractionResult::failed(NO_ANSWER));
    }

    #[test]
    fn test_process_records_counts() {
        let records = vec![
            record(json!({"id": "1", "gold": "A", "pred": "答案是A"})),
            record(json!({"id": "2", "gold": "B", "pred": "不知道"})),
            record(json!({"id": "3", "pred": "C"})),
            record(json!({"gold": "D", "pred": "D"})),
            record(json!({"id": "5", "gold": "A", "pred": "A", "category": "隐私保护"})),
        ];

        let (extracted, stats) = process_records(TaskId::ServiceSafety, &records);

        assert_eq!(stats.total_items, 5);
        assert_eq!(stats.invalid_items, 2);
        assert_eq!(stats.invalid_item_ids, vec!["3".to_string()]);
        assert_eq!(stats.processed_items, 3);
        assert_eq!(stats.extraction_failed_items, 1);
        assert_eq!(stats.extraction_failed_ids, vec!["2".to_string()]);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);

        assert_eq!(extracted[1].answer, NO_ANSWER);
        assert_eq!(extracted[2].category.as_deref(), Some("隐私保护"));
    }

    #[test]
    fn test_process_records_empty() {
        let (extracted, stats) = process_records(TaskId::MathReasoning, &[]);
        assert!(extracted.is_empty());
        assert_eq!(stats.success_rate, 0.0);
    }
}
