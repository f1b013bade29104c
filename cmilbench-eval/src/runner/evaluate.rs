//! Evaluation stage: extracted files to scored result tree

use std::path::Path;

use indexmap::IndexMap;

use super::{list_json_files, RunFilter};
use crate::analysis::{FileContext, MetricDispatcher, ResultTree, ScoreRecord};
use crate::tasks::{load_extracted_records, load_judge_scores, LoadError, TaskId};

/// Judge store for one model/task/language
pub fn judge_store_path(judge_dir: &Path, model: &str, task: TaskId, language: &str) -> std::path::PathBuf {
    judge_dir
        .join(model)
        .join(task.dir_name())
        .join(format!("{}_evaluation.json", language))
}

fn load_scores_for(judge_dir: &Path, model: &str, task: TaskId, language: &str) -> Option<IndexMap<String, f64>> {
    let path = judge_store_path(judge_dir, model, task, language);
    match load_judge_scores(&path) {
        Ok(scores) => {
            tracing::debug!("Loaded {} judge scores from {}", scores.len(), path.display());
            Some(scores)
        }
        Err(e) if e.is_not_found() => {
            tracing::warn!("Judge results not found: {}", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Could not load judge results {}: {}", path.display(), e);
            None
        }
    }
}

/// Score a single extracted file
pub fn evaluate_file(
    path: &Path,
    task: TaskId,
    model: &str,
    language: &str,
    file_name: &str,
    judge_dir: Option<&Path>,
) -> Result<Vec<ScoreRecord>, LoadError> {
    let records = load_extracted_records(path)?;
    if records.is_empty() {
        tracing::warn!("Empty extracted file: {}", path.display());
        return Ok(Vec::new());
    }

    let judge_scores = if task.is_judged() {
        judge_dir.and_then(|dir| load_scores_for(dir, model, task, language))
    } else {
        None
    };

    let ctx = FileContext {
        task,
        language,
        file_name,
    };
    Ok(MetricDispatcher::new().score_file(&ctx, &records, judge_scores.as_ref()))
}

/// Score every extracted file under `input_dir`
pub fn run_evaluation(input_dir: &Path, judge_dir: Option<&Path>, filter: &RunFilter) -> ResultTree {
    let mut tree = ResultTree::new();

    for model in filter.models(input_dir) {
        let model_dir = input_dir.join(&model);
        if !model_dir.is_dir() {
            tracing::warn!("Model directory not found: {}", model_dir.display());
            continue;
        }
        tracing::info!("Evaluating model: {}", model);

        for task_dir in filter.tasks(&model_dir) {
            let task_path = model_dir.join(&task_dir);
            if !task_path.is_dir() {
                continue;
            }
            let Some(task) = TaskId::from_dir_name(&task_dir) else {
                tracing::warn!("Skipping unknown task directory: {}", task_dir);
                continue;
            };
            tracing::info!("  Task: {}", task_dir);

            for language in filter.languages(&task_path) {
                let lang_path = task_path.join(&language);
                if !lang_path.is_dir() {
                    continue;
                }

                for file_name in list_json_files(&lang_path) {
                    let path = lang_path.join(&file_name);
                    match evaluate_file(&path, task, &model, &language, &file_name, judge_dir) {
                        Ok(scores) if scores.is_empty() => {
                            tracing::debug!("No scores for {}", path.display());
                        }
                        Ok(scores) => {
                            for score in &scores {
                                tracing::info!(
                                    "    {}/{} {}: all={:.4} success={:.4} ({}/{})",
                                    language,
                                    file_name,
                                    score.metric,
                                    score.score_all,
                                    score.score_success,
                                    score.success_count,
                                    score.sample_count
                                );
                            }
                            tree.insert(&model, &task_dir, &language, &file_name, scores);
                        }
                        Err(e) => {
                            tracing::warn!("Failed to evaluate {}: {}", path.display(), e);
                        }
                    }
                }
            }
        }
    }

    tree
}
