//! Task identifiers, metadata and record types

pub mod categories;
pub mod loader;

pub use categories::{Language, TaskGroup, TEXT_CATEGORIES};
pub use loader::{
    load_extracted_records, load_judge_scores, load_prediction_records, load_test_items,
    LoadError, TestItem,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every task of the benchmark.
///
/// This enum is the single source of truth for the mapping between the
/// directory-style names used on disk (`Coreference_Resolution`) and the
/// internal identifiers (`coref_resolution`), and for the way each task is
/// extracted and scored. The five safety sub-tasks are kept distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskId {
    CorefResolution,
    ProfessionalSkills,
    ReadingComprehension,
    MathReasoning,
    Entailment,
    TextClassification,
    TraditionalCulture,
    EthnicDomainKnowledge,
    EthnicVocabulary,
    TextGeneration,
    EthnicLanguageUnderstanding,
    Translation,
    CommercialCompliance,
    DiscriminationDetection,
    RightsProtection,
    ServiceSafety,
    ValueAlignment,
}

/// How an answer is pulled out of a raw model response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// Single or multi-select letter answers
    Choice,
    /// Open text used verbatim
    FreeText,
    /// One label out of [`TEXT_CATEGORIES`]
    Classification,
    /// A decimal number
    Numeric,
}

/// Which metric family scores a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringFamily {
    Accuracy,
    RougeL,
    /// chrF++ or BLEU, depending on translation direction
    Translation,
    LlmScore,
}

/// A concrete metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Accuracy,
    RougeL,
    ChrF,
    Bleu,
    LlmScore,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Accuracy => "Accuracy",
            Metric::RougeL => "ROUGE-L",
            Metric::ChrF => "chrF++",
            Metric::Bleu => "BLEU",
            Metric::LlmScore => "LLM-Score",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Translation direction, inferred from result file names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TranslationDirection {
    /// Chinese source, minority-language target (`zh2bo_...`)
    FromChinese,
    /// Minority-language source, Chinese target (`bo2zh_...`)
    IntoChinese,
}

impl TranslationDirection {
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        if file_name.contains("zh2") {
            Some(TranslationDirection::FromChinese)
        } else if file_name.contains("2zh") {
            Some(TranslationDirection::IntoChinese)
        } else {
            None
        }
    }

    pub fn metric(&self) -> Metric {
        match self {
            TranslationDirection::FromChinese => Metric::ChrF,
            TranslationDirection::IntoChinese => Metric::Bleu,
        }
    }
}

/// Static metadata attached to each [`TaskId`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    pub dir_name: &'static str,
    pub id: &'static str,
    pub group: TaskGroup,
    pub answer_kind: AnswerKind,
    pub family: ScoringFamily,
}

impl TaskId {
    pub const ALL: [TaskId; 17] = [
        TaskId::CorefResolution,
        TaskId::ProfessionalSkills,
        TaskId::ReadingComprehension,
        TaskId::MathReasoning,
        TaskId::Entailment,
        TaskId::TextClassification,
        TaskId::TraditionalCulture,
        TaskId::EthnicDomainKnowledge,
        TaskId::EthnicVocabulary,
        TaskId::TextGeneration,
        TaskId::EthnicLanguageUnderstanding,
        TaskId::Translation,
        TaskId::CommercialCompliance,
        TaskId::DiscriminationDetection,
        TaskId::RightsProtection,
        TaskId::ServiceSafety,
        TaskId::ValueAlignment,
    ];

    pub fn info(&self) -> TaskInfo {
        use AnswerKind::*;
        use ScoringFamily as F;
        use TaskGroup::*;

        let (dir_name, id, group, answer_kind, family) = match self {
            TaskId::CorefResolution => ("Coreference_Resolution", "coref_resolution", Foundation, Choice, F::Accuracy),
            TaskId::ProfessionalSkills => ("General_Domain_Competence", "professional_skills", Foundation, Choice, F::Accuracy),
            TaskId::ReadingComprehension => ("Machine_Reading_Comprehension", "reading_comprehension", Foundation, FreeText, F::RougeL),
            TaskId::MathReasoning => ("Math_Reasoning", "math_reasoning", Foundation, Numeric, F::Accuracy),
            TaskId::Entailment => ("Natural_Language_Inference", "entailment", Foundation, Choice, F::Accuracy),
            TaskId::TextClassification => ("Text_Classification", "text_classification", Foundation, Classification, F::Accuracy),
            TaskId::TraditionalCulture => ("Minority_Culture_QA", "traditional_culture", MinorityKnowledge, FreeText, F::LlmScore),
            TaskId::EthnicDomainKnowledge => ("Minority_Domain_Competence", "ethnic_domain_knowledge", MinorityKnowledge, Choice, F::Accuracy),
            TaskId::EthnicVocabulary => ("Minority_Language_Expressions", "ethnic_vocabulary", MinorityKnowledge, Choice, F::Accuracy),
            TaskId::TextGeneration => ("Minority_Language_Instruction_QA", "text_generation", MinorityKnowledge, FreeText, F::LlmScore),
            TaskId::EthnicLanguageUnderstanding => ("Minority_Language_Understanding", "ethnic_language_understanding", MinorityKnowledge, Choice, F::Accuracy),
            TaskId::Translation => ("Minority_Machine_Translation", "translation", MinorityKnowledge, FreeText, F::Translation),
            TaskId::CommercialCompliance => ("Commercial_Compliance_Check", "commercial_compliance", SafetyAlignment, Choice, F::Accuracy),
            TaskId::DiscriminationDetection => ("Discrimination_Detection", "discrimination_detection", SafetyAlignment, Choice, F::Accuracy),
            TaskId::RightsProtection => ("Rights_Protection_Evaluation", "rights_protection", SafetyAlignment, Choice, F::Accuracy),
            TaskId::ServiceSafety => ("Service_Safety_Evaluation", "service_safety", SafetyAlignment, Choice, F::Accuracy),
            TaskId::ValueAlignment => ("Value_Alignment_Assessment", "value_alignment", SafetyAlignment, Choice, F::Accuracy),
        };

        TaskInfo {
            dir_name,
            id,
            group,
            answer_kind,
            family,
        }
    }

    pub fn dir_name(&self) -> &'static str {
        self.info().dir_name
    }

    pub fn id(&self) -> &'static str {
        self.info().id
    }

    pub fn answer_kind(&self) -> AnswerKind {
        self.info().answer_kind
    }

    pub fn family(&self) -> ScoringFamily {
        self.info().family
    }

    pub fn is_safety(&self) -> bool {
        self.info().group == TaskGroup::SafetyAlignment
    }

    /// Tasks scored through the LLM judge
    pub fn is_judged(&self) -> bool {
        self.family() == ScoringFamily::LlmScore
    }

    pub fn judged() -> Vec<TaskId> {
        Self::ALL.iter().copied().filter(|t| t.is_judged()).collect()
    }

    /// Look up a task by its on-disk directory name
    pub fn from_dir_name(name: &str) -> Option<TaskId> {
        Self::ALL.iter().copied().find(|t| t.dir_name() == name)
    }

    /// Look up a task by its internal identifier
    pub fn from_id(id: &str) -> Option<TaskId> {
        Self::ALL.iter().copied().find(|t| t.id() == id)
    }

    /// The headline metric for one result file of this task.
    ///
    /// Translation files whose name carries no direction have no primary metric.
    pub fn primary_metric(&self, file_name: &str) -> Option<Metric> {
        match self.family() {
            ScoringFamily::Accuracy => Some(Metric::Accuracy),
            ScoringFamily::RougeL => Some(Metric::RougeL),
            ScoringFamily::LlmScore => Some(Metric::LlmScore),
            ScoringFamily::Translation => {
                TranslationDirection::from_file_name(file_name).map(|d| d.metric())
            }
        }
    }
}

impl std::str::FromStr for TaskId {
    type Err = String;

    /// Accepts either the directory name or the internal identifier
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskId::from_dir_name(s)
            .or_else(|| TaskId::from_id(s))
            .ok_or_else(|| format!("Unknown task: {}", s))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// One raw prediction record as produced by the inference stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionRecord {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub gold: Option<Value>,
    #[serde(default)]
    pub pred: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub api_response: Option<Value>,
}

impl PredictionRecord {
    pub fn id_string(&self) -> Option<String> {
        self.id.as_ref().and_then(value_to_text)
    }

    pub fn gold_string(&self) -> Option<String> {
        self.gold.as_ref().and_then(value_to_text)
    }

    pub fn pred_text(&self) -> &str {
        self.pred.as_deref().unwrap_or("")
    }

    /// Assistant message content of an attached chat-completion payload
    pub fn structured_content(&self) -> Option<&str> {
        self.api_response
            .as_ref()?
            .get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()
    }
}

/// A record after answer extraction, ready for scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub id: String,
    pub gold: String,
    #[serde(default)]
    pub pred: String,
    pub answer: String,
    #[serde(default = "default_true")]
    pub extraction_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Render scalar JSON values as text; arrays of scalars are concatenated
pub(crate) fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_to_text).collect();
            Some(parts.concat())
        }
        Value::Null | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_table_is_bijective() {
        for task in TaskId::ALL {
            assert_eq!(TaskId::from_dir_name(task.dir_name()), Some(task));
            assert_eq!(TaskId::from_id(task.id()), Some(task));
        }
        assert_eq!(TaskId::from_dir_name("Unknown_Task"), None);
    }

    #[test]
    fn test_safety_tasks_stay_distinct() {
        let safety: Vec<_> = TaskId::ALL.iter().filter(|t| t.is_safety()).collect();
        assert_eq!(safety.len(), 5);
        assert_eq!(TaskId::ValueAlignment.answer_kind(), AnswerKind::Choice);
    }

    #[test]
    fn test_primary_metric_for_translation() {
        let t = TaskId::Translation;
        assert_eq!(t.primary_metric("zh2bo_test.json"), Some(Metric::ChrF));
        assert_eq!(t.primary_metric("bo2zh_test.json"), Some(Metric::Bleu));
        assert_eq!(t.primary_metric("test.json"), None);
        assert_eq!(
            TaskId::TextGeneration.primary_metric("x.json"),
            Some(Metric::LlmScore)
        );
    }

    #[test]
    fn test_prediction_record_fields() {
        let record: PredictionRecord = serde_json::from_value(json!({
            "id": 17,
            "gold": ["A", "C"],
            "pred": "A C",
            "api_response": {"choices": [{"message": {"content": "答案是A"}}]}
        }))
        .unwrap();

        assert_eq!(record.id_string().as_deref(), Some("17"));
        assert_eq!(record.gold_string().as_deref(), Some("AC"));
        assert_eq!(record.structured_content(), Some("答案是A"));
    }
}
