//! LLM-judge schema, score parsing and result validation

use std::collections::HashMap;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tasks::{value_to_text, TaskId};

/// Prefix of judge text produced when the judge call itself failed
pub const CALL_FAILED: &str = "评估API调用失败:";
/// Judge text produced when the run was cancelled before or during the call
pub const CALL_ABORTED: &str = "评估API调用因脚本退出而中止";
/// Prefix of judge text produced when no prompt could be built
pub const PROMPT_FAILED: &str = "构建prompt失败:";

const FINAL_SCORE_LABEL: &str = "最终分数";
const ANALYSIS_LABEL: &str = "分析总结";

/// One scored dimension: the label the judge writes and the key it is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    pub label: &'static str,
    pub key: &'static str,
    pub definition: &'static str,
}

const fn dim(label: &'static str, key: &'static str, definition: &'static str) -> Dimension {
    Dimension { label, key, definition }
}

pub const FACTUAL_ACCURACY: Dimension = dim(
    "事实正确性",
    "factual_accuracy",
    "回答中提供的信息是否准确无误，是否基于可信的事实和数据",
);
pub const USER_NEEDS: Dimension = dim(
    "满足用户需求",
    "user_needs_satisfaction",
    "回答是否满足了用户提出问题的目的和需求，是否对问题进行了全面而恰当的回应",
);
pub const CLARITY: Dimension = dim(
    "清晰度",
    "clarity",
    "回答是否表达清晰、易懂，是否使用了简洁的语言和结构，以便用户可以轻松理解",
);
pub const COMPLETENESS: Dimension = dim(
    "完备性",
    "completeness",
    "回答是否提供了足够的信息和细节，以满足用户的需求，是否遗漏了重要的方面",
);
pub const LOGICAL_COHERENCE: Dimension = dim(
    "逻辑连贯性",
    "logical_coherence",
    "回答是否在整体上保持一致，是否在不同部分之间保持逻辑连贯性，避免了自相矛盾",
);
pub const CREATIVITY: Dimension = dim(
    "创造性",
    "creativity",
    "回答是否具有创新性或独特性，是否提供了新颖的见解或解决方法",
);
pub const RICHNESS: Dimension = dim(
    "丰富度",
    "richness",
    "回答包含丰富的信息、深度、上下文考虑、多样性、详细解释和实例，以满足用户需求并提供全面理解",
);
pub const FAIRNESS: Dimension = dim(
    "公平与可负责程度",
    "fairness_responsibility",
    "回答是否考虑了不同观点和立场，是否提供了公正的信息或建议，不携带私人的观点或者偏见，不偏袒某一方，提供的建议或信息是否可行，是否负有一定的责任，是否考虑了潜在风险和后果",
);
/// Definition is language-specific and filled in by the prompt builder
pub const LANGUAGE_USAGE: Dimension = dim("语言使用准确性", "language_usage_accuracy", "");

pub const CULTURE_DIMENSIONS: [Dimension; 6] = [
    dim("知识准确性", "knowledge_accuracy", "评估回答中文化知识点的准确性和可靠性"),
    dim("文化理解深度", "cultural_depth", "评估对文化背景、内涵和意义的深入理解"),
    dim("语言表达适切性", "expression", "评估语言表达是否符合文化语境和表达习惯"),
    dim("内容完整性", "completeness", "评估回答的完整性和全面性"),
    dim("内部视角真实性", "insider_perspective", "评估是否真实反映了该文化群体的内部观点和认知"),
    LANGUAGE_USAGE,
];

/// Answer types of the instruction-QA task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerType {
    FactExplanation,
    LogicalReasoning,
    Generative,
    Advisory,
}

impl AnswerType {
    pub fn label(&self) -> &'static str {
        match self {
            AnswerType::FactExplanation => "事实与解释型回答",
            AnswerType::LogicalReasoning => "逻辑推理型回答",
            AnswerType::Generative => "生成型回答",
            AnswerType::Advisory => "建议型回答",
        }
    }

    /// Scored dimensions, without the language-usage dimension
    pub fn base_dimensions(&self) -> &'static [Dimension] {
        match self {
            AnswerType::FactExplanation => &[FACTUAL_ACCURACY, USER_NEEDS, CLARITY, COMPLETENESS],
            AnswerType::LogicalReasoning => {
                &[FACTUAL_ACCURACY, USER_NEEDS, LOGICAL_COHERENCE, COMPLETENESS]
            }
            AnswerType::Generative => {
                &[FACTUAL_ACCURACY, USER_NEEDS, LOGICAL_COHERENCE, CREATIVITY, RICHNESS]
            }
            AnswerType::Advisory => &[FACTUAL_ACCURACY, USER_NEEDS, FAIRNESS, CREATIVITY],
        }
    }

    /// Map an instruction-QA subcategory; unknown or missing falls back to generative
    pub fn from_subcategory(subcategory: Option<&str>) -> AnswerType {
        match subcategory {
            Some(
                "常识知识" | "阅读理解" | "文本分类" | "信息抽取" | "字词理解" | "文化理解"
                | "物理" | "化学" | "计算机" | "生物医学" | "经济" | "天文" | "历史" | "音乐"
                | "法律" | "体育" | "地理" | "文学" | "其他",
            ) => AnswerType::FactExplanation,
            Some("观点表达" | "寻求建议") => AnswerType::Advisory,
            Some("证明" | "推理" | "初等数学" | "高等数学" | "应用数学") => {
                AnswerType::LogicalReasoning
            }
            _ => AnswerType::Generative,
        }
    }
}

/// Which dimensions the judge is asked to score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeSchema {
    CultureQa,
    InstructionQa(AnswerType),
}

impl JudgeSchema {
    /// Schema for a judged task; other tasks have none
    pub fn for_task(task: TaskId, subcategory: Option<&str>) -> Option<JudgeSchema> {
        match task {
            TaskId::TraditionalCulture => Some(JudgeSchema::CultureQa),
            TaskId::TextGeneration => Some(JudgeSchema::InstructionQa(
                AnswerType::from_subcategory(subcategory),
            )),
            _ => None,
        }
    }

    pub fn dimensions(&self) -> Vec<Dimension> {
        match self {
            JudgeSchema::CultureQa => CULTURE_DIMENSIONS.to_vec(),
            JudgeSchema::InstructionQa(answer_type) => {
                let mut dims = answer_type.base_dimensions().to_vec();
                dims.push(LANGUAGE_USAGE);
                dims
            }
        }
    }
}

/// Dimension keys the strict validator requires at least one of
pub fn expected_dimension_keys(task: TaskId) -> &'static [&'static str] {
    match task {
        TaskId::TextGeneration => &[
            "factual_accuracy",
            "user_needs_satisfaction",
            "language_usage_accuracy",
        ],
        TaskId::TraditionalCulture => &[
            "knowledge_accuracy",
            "cultural_depth",
            "expression",
            "completeness",
            "insider_perspective",
            "language_usage_accuracy",
        ],
        _ => &[],
    }
}

/// Parsed judge output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    /// Dimension key to score, in schema order
    pub dimension_scores: IndexMap<String, Option<f64>>,
    pub final_score: Option<f64>,
    pub analysis: Option<String>,
}

impl JudgeVerdict {
    fn all_null(schema: &JudgeSchema) -> Self {
        Self {
            dimension_scores: schema
                .dimensions()
                .iter()
                .map(|d| (d.key.to_string(), None))
                .collect(),
            final_score: None,
            analysis: None,
        }
    }
}

/// Judge text that marks a failed call rather than an actual judgement
pub fn is_failure_sentinel(text: &str) -> bool {
    text.starts_with(CALL_FAILED) || text.starts_with(CALL_ABORTED) || text.starts_with(PROMPT_FAILED)
}

fn score_pattern(label: &str) -> Regex {
    Regex::new(&format!(r"{}[：:]\s*\[?([1-5](?:\.\d+)?)\]?", regex::escape(label)))
        .expect("Invalid judge score regex")
}

static SCORE_PATTERNS: LazyLock<HashMap<&'static str, Regex>> = LazyLock::new(|| {
    let labels = CULTURE_DIMENSIONS
        .iter()
        .chain([
            FACTUAL_ACCURACY,
            USER_NEEDS,
            CLARITY,
            COMPLETENESS,
            LOGICAL_COHERENCE,
            CREATIVITY,
            RICHNESS,
            FAIRNESS,
        ].iter())
        .map(|d| d.label)
        .chain(std::iter::once(FINAL_SCORE_LABEL));

    labels.map(|label| (label, score_pattern(label))).collect()
});

static ANALYSIS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?s){}[：:]\s*(.+?){}[：:]", ANALYSIS_LABEL, FINAL_SCORE_LABEL))
        .expect("Invalid judge analysis regex")
});

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

/// First in-range score following `label`
fn find_score(text: &str, label: &str) -> Option<f64> {
    let captured = match SCORE_PATTERNS.get(label) {
        Some(re) => re.captures(text)?.get(1)?.as_str().to_string(),
        None => score_pattern(label).captures(text)?.get(1)?.as_str().to_string(),
    };

    match captured.parse::<f64>() {
        Ok(score) if (1.0..=5.0).contains(&score) => Some(score),
        Ok(score) => {
            tracing::debug!("Score out of range for {}: {}", label, score);
            None
        }
        Err(_) => {
            tracing::debug!("Unparsable score for {}: {}", label, captured);
            None
        }
    }
}

/// Round to two decimals, ties to even
fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Parse free-form judge text into a verdict.
///
/// Missing or failed judge text yields an all-null verdict. A missing final
/// score is back-filled with the mean of the parsed dimensions.
pub fn parse_verdict(text: Option<&str>, schema: &JudgeSchema) -> JudgeVerdict {
    let text = match text {
        Some(t) if !is_failure_sentinel(t) => t,
        _ => return JudgeVerdict::all_null(schema),
    };

    let dimension_scores: IndexMap<String, Option<f64>> = schema
        .dimensions()
        .iter()
        .map(|d| (d.key.to_string(), find_score(text, d.label)))
        .collect();

    let analysis = ANALYSIS_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| WHITESPACE_RUN.replace_all(m.as_str().trim(), " ").into_owned());

    let final_score = find_score(text, FINAL_SCORE_LABEL).or_else(|| {
        let parsed: Vec<f64> = dimension_scores.values().flatten().copied().collect();
        if parsed.is_empty() {
            None
        } else {
            Some(round2(parsed.iter().sum::<f64>() / parsed.len() as f64))
        }
    });

    let parsed_count = dimension_scores.values().filter(|v| v.is_some()).count();
    if parsed_count < dimension_scores.len() {
        tracing::debug!(
            "Parsed {}/{} judge dimensions; raw judge text:\n{}",
            parsed_count,
            dimension_scores.len(),
            text
        );
    }

    JudgeVerdict {
        dimension_scores,
        final_score,
        analysis,
    }
}

/// Stored judge result for one item
#[derive(Debug, Clone, Serialize)]
pub struct JudgeRecord {
    pub id: String,
    pub model: String,
    pub task_type: String,
    pub subcategory: Option<String>,
    pub language_param: String,
    pub language_evaluated: String,
    pub question: String,
    pub reference: String,
    pub prediction: String,
    pub evaluation: Option<String>,
    #[serde(flatten)]
    pub dimension_scores: IndexMap<String, Option<f64>>,
    pub analysis_summary: Option<String>,
    pub final_score: Option<f64>,
}

impl JudgeRecord {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A stored result counts when the call did not fail and a final score exists
pub fn is_successful(result: &Value) -> bool {
    let Some(obj) = result.as_object() else {
        return false;
    };

    match obj.get("evaluation") {
        Some(Value::String(text)) if text.starts_with(CALL_FAILED) || text.starts_with(CALL_ABORTED) => {
            return false
        }
        Some(Value::String(_)) | None => {}
        Some(_) => return false,
    }

    obj.get("final_score").is_some_and(|v| !v.is_null())
}

/// Strict validation of a stored result before it is accepted
pub fn validate(result: &Value, task: TaskId) -> Result<(), String> {
    let obj = result
        .as_object()
        .ok_or_else(|| "result is not an object".to_string())?;

    let missing: Vec<&str> = ["id", "model", "task_type", "evaluation", "final_score"]
        .into_iter()
        .filter(|f| !obj.contains_key(*f))
        .collect();
    if !missing.is_empty() {
        return Err(format!("missing required fields: {:?}", missing));
    }

    match obj.get("final_score").and_then(Value::as_f64) {
        Some(score) if (1.0..=5.0).contains(&score) => {}
        _ => return Err(format!("invalid final_score: {}", obj["final_score"])),
    }

    let expected = expected_dimension_keys(task);
    if expected.is_empty() {
        return Err(format!("unknown task type: {}", task.id()));
    }
    if !expected.iter().any(|k| obj.get(*k).is_some_and(|v| !v.is_null())) {
        return Err("no valid dimension scores".to_string());
    }

    Ok(())
}

/// Id of a stored result as text
pub fn result_id(result: &Value) -> Option<String> {
    result.get("id").and_then(value_to_text)
}
