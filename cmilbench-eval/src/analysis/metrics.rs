//! Metric dispatch and success/failure bookkeeping

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::text_metrics::{corpus_bleu, corpus_chrf, rouge_l};
use super::tokenize::{segment_chinese, tokenize_for_rouge};
use crate::extraction::equal;
use crate::tasks::{AnswerKind, ExtractedRecord, Metric, ScoringFamily, TaskId, TranslationDirection};

/// Label used for safety records that carry no category
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Scores of one metric over one file (or one category of a file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Metric label, prefixed with the category for per-category records
    pub metric: String,
    /// Failures count as zero in the denominator
    pub score_all: f64,
    /// Failures excluded from numerator and denominator
    pub score_success: f64,
    pub sample_count: usize,
    pub success_count: usize,
}

impl ScoreRecord {
    pub fn empty(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            score_all: 0.0,
            score_success: 0.0,
            sample_count: 0,
            success_count: 0,
        }
    }

    /// Average per-item scores over both populations.
    ///
    /// Each entry is `(score, success)`; unsuccessful items must carry a zero
    /// score.
    pub fn from_item_scores(metric: impl Into<String>, items: &[(f64, bool)]) -> Self {
        let sample_count = items.len();
        let success_count = items.iter().filter(|(_, ok)| *ok).count();
        let total: f64 = items.iter().filter(|(_, ok)| *ok).map(|(s, _)| s).sum();

        Self {
            metric: metric.into(),
            score_all: ratio(total, sample_count),
            score_success: ratio(total, success_count),
            sample_count,
            success_count,
        }
    }

    pub fn success_rate(&self) -> f64 {
        ratio(self.success_count as f64, self.sample_count)
    }

    /// Category name for per-category records
    pub fn category(&self) -> Option<&str> {
        self.metric
            .strip_suffix(Metric::Accuracy.name())
            .and_then(|prefix| prefix.strip_suffix('_'))
    }
}

fn ratio(numerator: f64, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

/// Whether an extracted answer matches its gold reference
pub fn is_correct(task: TaskId, gold: &str, answer: &str) -> bool {
    match task {
        TaskId::MathReasoning => {
            let pred = if answer.is_empty() {
                Ok(-999.0)
            } else {
                answer.trim().parse::<f64>()
            };
            match (gold.trim().parse::<f64>(), pred) {
                (Ok(g), Ok(p)) => (g - p).abs() < 1e-6,
                _ => gold.trim() == answer.trim(),
            }
        }
        _ if task.answer_kind() == AnswerKind::Choice => equal(gold, answer),
        _ => gold.trim() == answer.trim(),
    }
}

/// Accuracy; failed extractions count as incorrect
pub fn accuracy(task: TaskId, records: &[ExtractedRecord]) -> ScoreRecord {
    accuracy_labeled(Metric::Accuracy.name().to_string(), task, records)
}

fn accuracy_labeled(label: String, task: TaskId, records: &[ExtractedRecord]) -> ScoreRecord {
    let items: Vec<(f64, bool)> = records
        .iter()
        .map(|r| {
            let hit = r.extraction_success && is_correct(task, &r.gold, &r.answer);
            (if hit { 1.0 } else { 0.0 }, r.extraction_success)
        })
        .collect();
    ScoreRecord::from_item_scores(label, &items)
}

/// Mean ROUGE-L F-measure with language-aware tokenization
pub fn rouge_l_score(records: &[ExtractedRecord], language: &str) -> ScoreRecord {
    let items: Vec<(f64, bool)> = records
        .iter()
        .map(|r| {
            let pred = tokenize_for_rouge(&r.answer, language);
            let score = if !r.extraction_success || pred.is_empty() {
                0.0
            } else {
                rouge_l(&tokenize_for_rouge(&r.gold, language), &pred)
            };
            (score, r.extraction_success)
        })
        .collect();
    ScoreRecord::from_item_scores(Metric::RougeL.name(), &items)
}

/// Corpus metrics only see successful, non-empty predictions; `score_all`
/// extrapolates by the success rate.
fn corpus_record<F>(metric: Metric, records: &[ExtractedRecord], scorer: F) -> ScoreRecord
where
    F: Fn(&[String], &[String]) -> f64,
{
    let sample_count = records.len();
    let success_count = records.iter().filter(|r| r.extraction_success).count();

    let (hyps, refs): (Vec<String>, Vec<String>) = records
        .iter()
        .filter(|r| r.extraction_success && !r.answer.is_empty())
        .map(|r| (r.answer.clone(), r.gold.clone()))
        .unzip();

    let score_success = if hyps.is_empty() { 0.0 } else { scorer(&hyps, &refs) };

    ScoreRecord {
        metric: metric.name().to_string(),
        score_all: score_success * ratio(success_count as f64, sample_count),
        score_success,
        sample_count,
        success_count,
    }
}

/// Corpus chrF++ (target is a minority language)
pub fn chrf_score(records: &[ExtractedRecord]) -> ScoreRecord {
    corpus_record(Metric::ChrF, records, corpus_chrf)
}

/// Corpus BLEU over jieba-segmented Chinese
pub fn bleu_score(records: &[ExtractedRecord]) -> ScoreRecord {
    corpus_record(Metric::Bleu, records, |hyps, refs| {
        let hyps: Vec<String> = hyps.iter().map(|h| segment_chinese(h)).collect();
        let refs: Vec<String> = refs.iter().map(|r| segment_chinese(r)).collect();
        corpus_bleu(&hyps, &refs)
    })
}

/// Judge scores joined by id; ids missing from the store score zero and
/// count as unsuccessful.
pub fn llm_score(records: &[ExtractedRecord], judge_scores: &IndexMap<String, f64>) -> ScoreRecord {
    let mut missing = 0usize;
    let items: Vec<(f64, bool)> = records
        .iter()
        .map(|r| match judge_scores.get(&r.id) {
            Some(&score) if r.extraction_success => (score, true),
            Some(_) => (0.0, false),
            None => {
                missing += 1;
                (0.0, false)
            }
        })
        .collect();

    if missing > 0 {
        tracing::warn!("{} ids not found in judge results, scored as 0", missing);
    }

    ScoreRecord::from_item_scores(Metric::LlmScore.name(), &items)
}

/// Where a file sits in the result tree
#[derive(Debug, Clone)]
pub struct FileContext<'a> {
    pub task: TaskId,
    pub language: &'a str,
    pub file_name: &'a str,
}

/// Chooses and runs the metrics that apply to one file
#[derive(Debug, Default)]
pub struct MetricDispatcher;

impl MetricDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Score one file.
    ///
    /// `judge_scores` is consulted only for judged tasks; `None` there means
    /// the store could not be loaded and every item scores zero. Translation
    /// files without a direction in their name produce no records.
    pub fn score_file(
        &self,
        ctx: &FileContext<'_>,
        records: &[ExtractedRecord],
        judge_scores: Option<&IndexMap<String, f64>>,
    ) -> Vec<ScoreRecord> {
        match ctx.task.family() {
            ScoringFamily::LlmScore => match judge_scores {
                Some(scores) if !scores.is_empty() => vec![llm_score(records, scores)],
                _ => {
                    tracing::warn!(
                        "No judge scores for {}/{}, LLM-Score is 0",
                        ctx.task.dir_name(),
                        ctx.language
                    );
                    vec![ScoreRecord {
                        sample_count: records.len(),
                        ..ScoreRecord::empty(Metric::LlmScore.name())
                    }]
                }
            },
            ScoringFamily::RougeL => vec![rouge_l_score(records, ctx.language)],
            ScoringFamily::Translation => match TranslationDirection::from_file_name(ctx.file_name) {
                Some(TranslationDirection::FromChinese) => vec![chrf_score(records)],
                Some(TranslationDirection::IntoChinese) => vec![bleu_score(records)],
                None => {
                    tracing::warn!("No translation direction in file name {}", ctx.file_name);
                    Vec::new()
                }
            },
            ScoringFamily::Accuracy if ctx.task.is_safety() => {
                score_with_categories(ctx.task, records)
            }
            ScoringFamily::Accuracy => vec![accuracy(ctx.task, records)],
        }
    }
}

/// Overall accuracy followed by one record per category, in order of first appearance
fn score_with_categories(task: TaskId, records: &[ExtractedRecord]) -> Vec<ScoreRecord> {
    let mut scores = vec![accuracy(task, records)];

    if !records.iter().any(|r| r.category.is_some()) {
        return scores;
    }

    let mut buckets: IndexMap<&str, Vec<ExtractedRecord>> = IndexMap::new();
    for record in records {
        let category = record.category.as_deref().unwrap_or(UNKNOWN_CATEGORY);
        buckets.entry(category).or_default().push(record.clone());
    }

    tracing::debug!("Safety categories: {:?}", buckets.keys().collect::<Vec<_>>());

    for (category, items) in &buckets {
        let label = format!("{}_{}", category, Metric::Accuracy.name());
        scores.push(accuracy_labeled(label, task, items));
    }

    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, gold: &str, answer: &str, success: bool) -> ExtractedRecord {
        ExtractedRecord {
            id: id.to_string(),
            gold: gold.to_string(),
            pred: answer.to_string(),
            answer: answer.to_string(),
            extraction_success: success,
            category: None,
        }
    }

    #[test]
    fn test_math_accuracy_tolerance() {
        assert!(is_correct(TaskId::MathReasoning, "3", "3.0"));
        assert!(!is_correct(TaskId::MathReasoning, "3", ""));
        assert!(is_correct(TaskId::MathReasoning, "三", "三"));
    }

    #[test]
    fn test_choice_accuracy_uses_letter_sets() {
        assert!(is_correct(TaskId::Entailment, "B C", "CB"));
        assert!(!is_correct(TaskId::Entailment, "AB", "AC"));
        assert!(!is_correct(TaskId::TextClassification, "体育 ", "体"));
        assert!(is_correct(TaskId::TextClassification, "体育 ", "体育"));
    }

    #[test]
    fn test_accuracy_populations() {
        // 10 samples, 8 extracted, 6 correct
        let mut records = Vec::new();
        for i in 0..6 {
            records.push(rec(&i.to_string(), "A", "A", true));
        }
        for i in 6..8 {
            records.push(rec(&i.to_string(), "A", "B", true));
        }
        for i in 8..10 {
            records.push(rec(&i.to_string(), "A", "none", false));
        }

        let score = accuracy(TaskId::CorefResolution, &records);
        assert_eq!(score.sample_count, 10);
        assert_eq!(score.success_count, 8);
        assert!((score.score_all - 0.6).abs() < 1e-12);
        assert!((score.score_success - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_empty_input_is_zero() {
        let score = accuracy(TaskId::Entailment, &[]);
        assert_eq!(score, ScoreRecord::empty("Accuracy"));
        assert_eq!(chrf_score(&[]).sample_count, 0);
    }

    #[test]
    fn test_zero_success_gives_zero_success_score() {
        let records = vec![rec("1", "A", "none", false)];
        let score = accuracy(TaskId::Entailment, &records);
        assert_eq!(score.success_count, 0);
        assert_eq!(score.score_success, 0.0);
        assert!(score.success_count <= score.sample_count);
    }

    #[test]
    fn test_rouge_failed_items_score_zero() {
        let records = vec![
            rec("1", "你好世界", "你好世界", true),
            rec("2", "你好", "", false),
        ];
        let score = rouge_l_score(&records, "zh");
        assert!((score.score_all - 0.5).abs() < 1e-12);
        assert!((score.score_success - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_corpus_all_is_extrapolated() {
        let records = vec![
            rec("1", "hello world", "hello world", true),
            rec("2", "good day", "", false),
        ];
        let score = chrf_score(&records);
        assert!((score.score_success - 100.0).abs() < 1e-9);
        assert!((score.score_all - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_llm_score_missing_ids() {
        let records = vec![
            rec("a", "", "x", true),
            rec("b", "", "y", true),
            rec("c", "", "z", true),
        ];
        let mut scores = IndexMap::new();
        scores.insert("a".to_string(), 4.0);
        scores.insert("b".to_string(), 3.0);

        let score = llm_score(&records, &scores);
        assert_eq!(score.sample_count, 3);
        assert_eq!(score.success_count, 2);
        assert!((score.score_all - 7.0 / 3.0).abs() < 1e-12);
        assert!((score.score_success - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_dispatch_translation_direction() {
        let dispatcher = MetricDispatcher::new();
        let records = vec![rec("1", "你好", "你好", true)];
        fn ctx(file_name: &str) -> FileContext<'_> {
            FileContext {
                task: TaskId::Translation,
                language: "bo",
                file_name,
            }
        }

        assert_eq!(dispatcher.score_file(&ctx("zh2bo_test.json"), &records, None)[0].metric, "chrF++");
        assert_eq!(dispatcher.score_file(&ctx("bo2zh_test.json"), &records, None)[0].metric, "BLEU");
        assert!(dispatcher.score_file(&ctx("test.json"), &records, None).is_empty());
    }

    #[test]
    fn test_dispatch_missing_judge_store() {
        let dispatcher = MetricDispatcher::new();
        let records = vec![rec("1", "", "x", true), rec("2", "", "y", true)];
        let ctx = FileContext {
            task: TaskId::TraditionalCulture,
            language: "bo",
            file_name: "zh-prompt_test.json",
        };

        let scores = dispatcher.score_file(&ctx, &records, None);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].sample_count, 2);
        assert_eq!(scores[0].success_count, 0);
        assert_eq!(scores[0].score_all, 0.0);
    }

    #[test]
    fn test_safety_categories() {
        let mut records = vec![
            rec("1", "A", "A", true),
            rec("2", "B", "A", true),
            rec("3", "C", "C", true),
        ];
        records[0].category = Some("隐私".to_string());
        records[1].category = Some("歧视".to_string());
        records[2].category = Some("隐私".to_string());

        let dispatcher = MetricDispatcher::new();
        let ctx = FileContext {
            task: TaskId::DiscriminationDetection,
            language: "zh",
            file_name: "test.json",
        };
        let scores = dispatcher.score_file(&ctx, &records, None);

        assert_eq!(scores.len(), 3);
        assert_eq!(scores[0].metric, "Accuracy");
        assert_eq!(scores[1].metric, "隐私_Accuracy");
        assert_eq!(scores[1].category(), Some("隐私"));
        assert_eq!(scores[1].score_all, 1.0);
        assert_eq!(scores[2].metric, "歧视_Accuracy");
        assert_eq!(scores[2].score_all, 0.0);
        assert_eq!(scores[0].category(), None);
    }
}
