//! Result tree, summary table and model rankings

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::metrics::ScoreRecord;
use crate::tasks::{Language, TaskId, TranslationDirection};

/// Which population a summary row reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreType {
    All,
    Success,
}

impl ScoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreType::All => "all",
            ScoreType::Success => "success",
        }
    }
}

/// One row of `evaluation_summary.csv`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "Task")]
    pub task: String,
    #[serde(rename = "Language")]
    pub language: String,
    #[serde(rename = "File")]
    pub file: String,
    #[serde(rename = "Metric")]
    pub metric: String,
    #[serde(rename = "Score_Type")]
    pub score_type: ScoreType,
    #[serde(rename = "Score")]
    pub score: f64,
    #[serde(rename = "Sample_Count")]
    pub sample_count: usize,
    #[serde(rename = "Success_Count")]
    pub success_count: usize,
    #[serde(rename = "Success_Rate")]
    pub success_rate: f64,
}

/// One row of `task_ranking.csv`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRank {
    #[serde(rename = "Task_Key")]
    pub task_key: String,
    #[serde(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "Metric")]
    pub metric: String,
    #[serde(rename = "Score")]
    pub score: f64,
}

/// One row of `model_overall_ranking.csv`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallRank {
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "Average_Rank")]
    pub average_rank: f64,
    #[serde(rename = "Total_Score")]
    pub total_score: f64,
    #[serde(rename = "Tasks_Evaluated")]
    pub tasks_evaluated: usize,
    #[serde(rename = "Overall_Rank")]
    pub overall_rank: usize,
}

/// Task-level and overall rankings
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rankings {
    pub task_rankings: Vec<TaskRank>,
    pub overall: Vec<OverallRank>,
}

type FileScores = IndexMap<String, Vec<ScoreRecord>>;

/// `model -> task_dir -> language -> file -> records`, in insertion order
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultTree {
    models: IndexMap<String, IndexMap<String, IndexMap<String, FileScores>>>,
}

impl ResultTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        model: &str,
        task_dir: &str,
        language: &str,
        file: &str,
        records: Vec<ScoreRecord>,
    ) {
        self.models
            .entry(model.to_string())
            .or_default()
            .entry(task_dir.to_string())
            .or_default()
            .entry(language.to_string())
            .or_default()
            .insert(file.to_string(), records);
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Every `(model, task_dir, language, file, records)` leaf
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str, &str, &[ScoreRecord])> {
        self.models.iter().flat_map(|(model, tasks)| {
            tasks.iter().flat_map(move |(task, langs)| {
                langs.iter().flat_map(move |(lang, files)| {
                    files.iter().map(move |(file, records)| {
                        (
                            model.as_str(),
                            task.as_str(),
                            lang.as_str(),
                            file.as_str(),
                            records.as_slice(),
                        )
                    })
                })
            })
        })
    }

    pub fn get(&self, model: &str, task_dir: &str, language: &str, file: &str) -> Option<&[ScoreRecord]> {
        self.models
            .get(model)?
            .get(task_dir)?
            .get(language)?
            .get(file)
            .map(Vec::as_slice)
    }

    /// Primary `all` score of one file, if its task and primary metric are known
    pub fn primary_score(&self, model: &str, task_dir: &str, language: &str, file: &str) -> Option<(String, f64)> {
        let metric = TaskId::from_dir_name(task_dir)?.primary_metric(file)?;
        self.get(model, task_dir, language, file)?
            .iter()
            .find(|r| r.metric == metric.name())
            .map(|r| (r.metric.clone(), r.score_all))
    }

    /// Flat summary table: both populations of every primary-metric record,
    /// plus per-category accuracy rows of safety tasks
    pub fn summary_rows(&self) -> Vec<SummaryRow> {
        let mut rows = Vec::new();

        for (model, task_dir, lang, file, records) in self.iter() {
            let Some(task) = TaskId::from_dir_name(task_dir) else {
                tracing::warn!("Skipping unknown task directory in summary: {}", task_dir);
                continue;
            };
            let primary = task.primary_metric(file).map(|m| m.name());
            let language = Language::display_for_code(lang);

            for record in records {
                let keep = Some(record.metric.as_str()) == primary
                    || (task.is_safety() && record.category().is_some());
                if !keep {
                    continue;
                }

                for (score_type, score) in [
                    (ScoreType::All, record.score_all),
                    (ScoreType::Success, record.score_success),
                ] {
                    rows.push(SummaryRow {
                        model: model.to_string(),
                        task: task_dir.to_string(),
                        language: language.clone(),
                        file: file.to_string(),
                        metric: record.metric.clone(),
                        score_type,
                        score,
                        sample_count: record.sample_count,
                        success_count: record.success_count,
                        success_rate: record.success_rate(),
                    });
                }
            }
        }

        rows
    }

    /// Rank models per `(task, language, file)` and overall.
    ///
    /// Ties keep the first-encountered model first. A model at rank `r` among
    /// `n` models of a key contributes `n - r + 1` to its total.
    pub fn rankings(&self) -> Rankings {
        let mut per_key: IndexMap<String, Vec<(String, String, f64)>> = IndexMap::new();
        let mut labels: IndexMap<String, String> = IndexMap::new();

        for (model, task_dir, lang, file, _) in self.iter() {
            let Some((metric, score)) = self.primary_score(model, task_dir, lang, file) else {
                continue;
            };
            let key = format!("{}|{}|{}", task_dir, lang, file);
            labels
                .entry(key.clone())
                .or_insert_with(|| task_label(task_dir, lang, file));
            per_key
                .entry(key)
                .or_default()
                .push((model.to_string(), metric, score));
        }
        per_key.sort_keys();

        let mut task_rankings = Vec::new();
        let mut totals: IndexMap<String, (Vec<usize>, f64)> = IndexMap::new();

        for (key, mut entries) in per_key {
            entries.sort_by(|a, b| b.2.total_cmp(&a.2));
            let num_models = entries.len();
            let label = labels.get(&key).cloned().unwrap_or_else(|| key.clone());

            for (index, (model, metric, score)) in entries.into_iter().enumerate() {
                let rank = index + 1;
                let entry = totals.entry(model.clone()).or_default();
                entry.0.push(rank);
                entry.1 += (num_models - rank + 1) as f64;

                task_rankings.push(TaskRank {
                    task_key: label.clone(),
                    rank,
                    model,
                    metric,
                    score,
                });
            }
        }

        let mut overall: Vec<OverallRank> = totals
            .into_iter()
            .map(|(model, (ranks, total_score))| OverallRank {
                average_rank: ranks.iter().sum::<usize>() as f64 / ranks.len() as f64,
                tasks_evaluated: ranks.len(),
                model,
                total_score,
                overall_rank: 0,
            })
            .collect();
        overall.sort_by(|a, b| b.total_score.total_cmp(&a.total_score));
        for (index, row) in overall.iter_mut().enumerate() {
            row.overall_rank = index + 1;
        }

        Rankings {
            task_rankings,
            overall,
        }
    }
}

/// Display key of a ranking group; translation adds the direction segment of the file name
fn task_label(task_dir: &str, lang: &str, file: &str) -> String {
    let is_translation = TaskId::from_dir_name(task_dir) == Some(TaskId::Translation);
    match file.split('_').nth(1) {
        Some(direction) if is_translation && TranslationDirection::from_file_name(file).is_some() => {
            format!("{}_{}_{}", task_dir, lang, direction)
        }
        _ => format!("{}_{}", task_dir, lang),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accuracy(score: f64) -> Vec<ScoreRecord> {
        vec![ScoreRecord {
            metric: "Accuracy".to_string(),
            score_all: score,
            score_success: score,
            sample_count: 10,
            success_count: 10,
        }]
    }

    #[test]
    fn test_two_model_ranking() {
        let mut tree = ResultTree::new();
        tree.insert("A", "Math_Reasoning", "bo", "zh-prompt_test.json", accuracy(0.8));
        tree.insert("B", "Math_Reasoning", "bo", "zh-prompt_test.json", accuracy(0.6));

        let rankings = tree.rankings();
        assert_eq!(rankings.task_rankings[0].model, "A");
        assert_eq!(rankings.task_rankings[0].rank, 1);
        assert_eq!(rankings.task_rankings[1].rank, 2);
        assert_eq!(rankings.task_rankings[0].task_key, "Math_Reasoning_bo");

        assert_eq!(rankings.overall[0].model, "A");
        assert_eq!(rankings.overall[0].total_score, 2.0);
        assert_eq!(rankings.overall[1].total_score, 1.0);
        assert_eq!(rankings.overall[1].overall_rank, 2);
    }

    #[test]
    fn test_ties_keep_first_model() {
        let mut tree = ResultTree::new();
        tree.insert("B", "Math_Reasoning", "mn", "f.json", accuracy(0.5));
        tree.insert("A", "Math_Reasoning", "mn", "f.json", accuracy(0.5));

        let rankings = tree.rankings();
        let models: Vec<_> = rankings.task_rankings.iter().map(|r| r.model.as_str()).collect();
        assert_eq!(models, vec!["B", "A"]);
        assert_eq!(rankings.overall[0].model, "B");
    }

    #[test]
    fn test_average_rank_across_keys() {
        let mut tree = ResultTree::new();
        tree.insert("A", "Math_Reasoning", "bo", "f.json", accuracy(0.9));
        tree.insert("A", "Math_Reasoning", "ug", "f.json", accuracy(0.1));
        tree.insert("B", "Math_Reasoning", "bo", "f.json", accuracy(0.2));
        tree.insert("B", "Math_Reasoning", "ug", "f.json", accuracy(0.3));

        let overall = tree.rankings().overall;
        assert!(overall.iter().all(|r| r.average_rank == 1.5 && r.tasks_evaluated == 2));
        assert!(overall.iter().all(|r| r.total_score == 3.0));
    }

    #[test]
    fn test_translation_label_and_metric() {
        let mut tree = ResultTree::new();
        let chrf = vec![ScoreRecord {
            metric: "chrF++".to_string(),
            score_all: 40.0,
            score_success: 50.0,
            sample_count: 5,
            success_count: 4,
        }];
        tree.insert("A", "Minority_Machine_Translation", "ug", "zh-prompt_zh2ug_test.json", chrf);
        tree.insert("A", "Minority_Machine_Translation", "ug", "zh-prompt_other.json", accuracy(1.0));

        let rankings = tree.rankings();
        assert_eq!(rankings.task_rankings.len(), 1);
        assert_eq!(rankings.task_rankings[0].task_key, "Minority_Machine_Translation_ug_zh2ug");
        assert_eq!(rankings.task_rankings[0].score, 40.0);
    }

    #[test]
    fn test_summary_rows_primary_and_categories() {
        let mut tree = ResultTree::new();
        let records = vec![
            ScoreRecord {
                metric: "Accuracy".to_string(),
                score_all: 0.5,
                score_success: 0.625,
                sample_count: 10,
                success_count: 8,
            },
            ScoreRecord {
                metric: "隐私保护_Accuracy".to_string(),
                score_all: 1.0,
                score_success: 1.0,
                sample_count: 2,
                success_count: 2,
            },
        ];
        tree.insert("A", "Service_Safety_Evaluation", "bo", "f.json", records);
        tree.insert("A", "Math_Reasoning", "bo", "f.json", accuracy(0.3));

        let rows = tree.summary_rows();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].score_type, ScoreType::All);
        assert_eq!(rows[1].score, 0.625);
        assert!((rows[0].success_rate - 0.8).abs() < 1e-9);
        assert_eq!(rows[2].metric, "隐私保护_Accuracy");
        assert_eq!(rows[0].language, Language::display_for_code("bo"));
    }
}
