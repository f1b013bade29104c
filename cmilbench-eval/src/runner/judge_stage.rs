//! LLM-judge stage: score open-ended answers per model, task and language

use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::Value;
use tokio::task::JoinSet;

use super::checkpoint::{write_json_atomic, ResumeState, RunDescriptor};
use super::executor::JudgeExecutor;
use super::prompt::JudgeInput;
use super::RunFilter;
use crate::analysis::judge::{is_successful, parse_verdict, validate, CALL_ABORTED};
use crate::analysis::{JudgeRecord, JudgeSchema};
use crate::config::{Config, PathsConfig};
use crate::tasks::{load_prediction_records, load_test_items, Language, TaskId};

/// File name of the raw predictions the judge reads
pub const PREDICTION_FILE: &str = "zh-prompt_test.json";

const DETAIL_CHARS: usize = 500;

/// Knobs for one judge run
#[derive(Debug, Clone)]
pub struct JudgeStageOptions {
    pub resume: bool,
    pub sample_size: Option<usize>,
    pub sample_seed: u64,
    pub checkpoint_interval_items: usize,
    pub checkpoint_interval: Duration,
}

impl From<&Config> for JudgeStageOptions {
    fn from(config: &Config) -> Self {
        Self {
            resume: false,
            sample_size: config.runner.sample_size,
            sample_seed: config.runner.sample_seed,
            checkpoint_interval_items: config.runner.checkpoint_interval_items.max(1),
            checkpoint_interval: Duration::from_secs(config.runner.checkpoint_interval_secs),
        }
    }
}

/// Result of judging one model/task/language
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskRunOutcome {
    pub model: String,
    pub task: Option<TaskId>,
    pub language: String,
    pub total_predictions: usize,
    pub newly_successful: usize,
    pub failed: usize,
    /// Successful ids including earlier runs
    pub total_successful: usize,
    pub cancelled: bool,
    pub checkpoint_removed: bool,
}

/// Files kept next to each other under `<judge_dir>/<model>/<TaskDir>/`
#[derive(Debug, Clone)]
pub struct JudgePaths {
    pub output: PathBuf,
    pub checkpoint: PathBuf,
    pub error_log: PathBuf,
    pub error_ids: PathBuf,
}

impl JudgePaths {
    pub fn new(judge_dir: &Path, model: &str, task: TaskId, language: &str) -> Self {
        let dir = judge_dir.join(model).join(task.dir_name());
        Self {
            output: dir.join(format!("{}_evaluation.json", language)),
            checkpoint: dir.join(format!("{}_checkpoint.json", language)),
            error_log: dir.join(format!("{}_errors.log", language)),
            error_ids: dir.join(format!("{}_error_ids.json", language)),
        }
    }
}

/// Appends human-readable failures and keeps a de-duplicated list of failed ids
struct ErrorLog<'a> {
    paths: &'a JudgePaths,
}

impl ErrorLog<'_> {
    fn record(&self, message: &str, error: Option<&dyn Display>, ids: &[String], details: &str) {
        tracing::warn!("{} {:?} {}", message, ids, details);

        let mut entry = format!(
            "=== {} ===\n错误信息: {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            message
        );
        if let Some(error) = error {
            entry.push_str(&format!("异常详情: {}\n", error));
        }
        if !details.is_empty() {
            entry.push_str(&format!("补充信息: {}\n", details));
        }
        entry.push('\n');

        if let Err(e) = self.append(&entry) {
            tracing::error!("Failed to write {}: {}", self.paths.error_log.display(), e);
        }
        if !ids.is_empty() {
            if let Err(e) = self.merge_ids(ids) {
                tracing::error!("Failed to write {}: {}", self.paths.error_ids.display(), e);
            }
        }
    }

    fn append(&self, entry: &str) -> std::io::Result<()> {
        if let Some(parent) = self.paths.error_log.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.paths.error_log)?;
        file.write_all(entry.as_bytes())
    }

    fn merge_ids(&self, ids: &[String]) -> Result<(), super::CheckpointError> {
        let mut existing: Vec<String> = fs::read_to_string(&self.paths.error_ids)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        for id in ids {
            if !id.is_empty() && !existing.contains(id) {
                existing.push(id.clone());
            }
        }
        write_json_atomic(&self.paths.error_ids, &existing)
    }
}

/// Owned data of one pending item, moved into its judge task
struct Job {
    id: String,
    question: String,
    reference: String,
    prediction: String,
    subcategory: Option<String>,
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Judge every pending prediction of one model/task/language.
///
/// Successful results are merged with what earlier runs stored; failures are
/// logged next to the output and retried on the next resumed run.
pub async fn run_judge_task(
    executor: &JudgeExecutor,
    dirs: &PathsConfig,
    model: &str,
    task: TaskId,
    language: &str,
    options: &JudgeStageOptions,
) -> TaskRunOutcome {
    let mut outcome = TaskRunOutcome {
        model: model.to_string(),
        task: Some(task),
        language: language.to_string(),
        ..Default::default()
    };

    if !task.is_judged() {
        tracing::warn!("Task {} is not judged by an LLM, skipping", task.dir_name());
        return outcome;
    }
    if executor.is_cancelled() {
        outcome.cancelled = true;
        return outcome;
    }

    tracing::info!("Judging model={} task={} language={}", model, task.dir_name(), language);

    let paths = JudgePaths::new(&dirs.judge_dir, model, task, language);
    let errors = ErrorLog { paths: &paths };

    let mut state = if options.resume {
        ResumeState::load(&paths.output, &paths.checkpoint)
    } else {
        ResumeState::default()
    };

    let test_path = dirs
        .test_data_dir
        .join(task.info().group.dir_name())
        .join(task.dir_name())
        .join(format!("{}.json", language));
    let test_items = match load_test_items(&test_path) {
        Ok(items) if !items.is_empty() => items,
        result => {
            let error = result.err();
            errors.record(
                "测试数据加载失败",
                error.as_ref().map(|e| e as &dyn Display),
                &[],
                &format!("{}/{}", task.id(), language),
            );
            outcome.total_successful = state.len();
            return outcome;
        }
    };

    let prediction_path = dirs
        .predictions_dir
        .join(model)
        .join(task.dir_name())
        .join(language)
        .join(PREDICTION_FILE);
    let predictions = match load_prediction_records(&prediction_path) {
        Ok(records) if !records.is_empty() => records,
        result => {
            let error = result.err();
            errors.record(
                "模型预测加载失败",
                error.as_ref().map(|e| e as &dyn Display),
                &[],
                &format!("{}/{}/{}", model, task.id(), language),
            );
            outcome.total_successful = state.len();
            return outcome;
        }
    };
    outcome.total_predictions = predictions.len();

    let mut pending: Vec<_> = predictions
        .iter()
        .filter_map(|p| p.id_string().filter(|id| !id.is_empty()).map(|id| (id, p)))
        .filter(|(id, _)| !state.contains(id))
        .collect();

    if pending.is_empty() {
        tracing::info!("All {} predictions already judged", predictions.len());
        if !state.is_empty() {
            if let Err(e) = write_json_atomic(&paths.output, &state.results) {
                tracing::error!("Failed to save {}: {}", paths.output.display(), e);
            }
        }
        outcome.checkpoint_removed = remove_checkpoint(&paths.checkpoint);
        outcome.total_successful = state.len();
        return outcome;
    }

    tracing::info!(
        "{} predictions, {} pending, {} already successful",
        predictions.len(),
        pending.len(),
        state.len()
    );

    if let Some(n) = options.sample_size.filter(|&n| n > 0 && n < pending.len()) {
        let mut rng = StdRng::seed_from_u64(options.sample_seed);
        pending = pending.choose_multiple(&mut rng, n).cloned().collect();
        tracing::info!("Sampled {} items (seed {})", pending.len(), options.sample_seed);
    }

    let mut set = JoinSet::new();
    for (id, prediction) in pending {
        if executor.is_cancelled() {
            break;
        }

        let Some(item) = test_items.get(&id) else {
            errors.record(
                "找不到原始测试数据",
                None,
                std::slice::from_ref(&id),
                &format!("Task: {}, Lang: {}", task.id(), language),
            );
            continue;
        };

        let subcategory = if task == TaskId::TextGeneration {
            prediction.subcategory.clone()
        } else {
            None
        };
        if task == TaskId::TextGeneration {
            tracing::debug!("Item {} subcategory: {:?}", id, subcategory);
        }

        let job = Job {
            id,
            question: item.question.clone(),
            reference: item.answer.clone(),
            prediction: prediction
                .answer
                .clone()
                .unwrap_or_else(|| prediction.pred_text().to_string()),
            subcategory,
        };

        let executor = executor.clone();
        let language = language.to_string();
        set.spawn(async move {
            let input = JudgeInput {
                task,
                language: &language,
                question: &job.question,
                reference: &job.reference,
                prediction: &job.prediction,
                subcategory: job.subcategory.as_deref(),
            };
            let text = executor.evaluate(&input).await;
            (job, text)
        });
    }

    let mut processed = 0usize;
    let mut last_checkpoint = Instant::now();

    while let Some(joined) = set.join_next().await {
        processed += 1;

        let (job, text) = match joined {
            Ok(done) => done,
            Err(e) => {
                outcome.failed += 1;
                errors.record("处理样本时发生严重错误", Some(&e as &dyn Display), &[], "");
                continue;
            }
        };

        if text.starts_with(CALL_ABORTED) {
            outcome.failed += 1;
            errors.record("任务被取消", None, std::slice::from_ref(&job.id), "可能由于脚本退出信号");
            continue;
        }

        let Some(schema) = JudgeSchema::for_task(task, job.subcategory.as_deref()) else {
            outcome.failed += 1;
            continue;
        };
        let verdict = parse_verdict(Some(&text), &schema);
        let record = JudgeRecord {
            id: job.id.clone(),
            model: model.to_string(),
            task_type: task.id().to_string(),
            subcategory: job.subcategory,
            language_param: language.to_string(),
            language_evaluated: language.to_string(),
            question: job.question,
            reference: job.reference,
            prediction: job.prediction,
            evaluation: Some(text.clone()),
            dimension_scores: verdict.dimension_scores,
            analysis_summary: verdict.analysis,
            final_score: verdict.final_score,
        };
        let value: Value = record.to_value();

        match validate(&value, task) {
            Ok(()) if is_successful(&value) => {
                if state.push(job.id, value) {
                    outcome.newly_successful += 1;
                }
            }
            checked => {
                outcome.failed += 1;
                let message = match checked {
                    Err(reason) => format!("验证失败: {}", reason),
                    Ok(()) => "评估不成功".to_string(),
                };
                let details = if text.is_empty() {
                    "无评估文本".to_string()
                } else {
                    truncate_chars(&text, DETAIL_CHARS)
                };
                errors.record(&message, None, std::slice::from_ref(&job.id), &details);
            }
        }

        let due = processed % options.checkpoint_interval_items.max(1) == 0
            || last_checkpoint.elapsed() > options.checkpoint_interval;
        if due && !state.is_empty() {
            tracing::info!("Checkpoint after {} items this run", processed);
            if let Err(e) = RunDescriptor::new(&state).save(&paths.checkpoint) {
                tracing::error!("Failed to save checkpoint {}: {}", paths.checkpoint.display(), e);
            }
            last_checkpoint = Instant::now();
        }
    }

    outcome.cancelled = executor.is_cancelled();
    outcome.total_successful = state.len();

    if !state.is_empty() {
        if let Err(e) = write_json_atomic(&paths.output, &state.results) {
            tracing::error!("Failed to save {}: {}", paths.output.display(), e);
        }
        if let Err(e) = RunDescriptor::new(&state).save(&paths.checkpoint) {
            tracing::error!("Failed to save checkpoint {}: {}", paths.checkpoint.display(), e);
        }
    } else {
        tracing::info!("No successful judge results to save");
    }

    let complete = state.len() >= outcome.total_predictions;
    if complete && !outcome.cancelled && outcome.failed == 0 {
        outcome.checkpoint_removed = remove_checkpoint(&paths.checkpoint);
    } else if outcome.cancelled {
        tracing::info!("Interrupted, keeping checkpoint {}", paths.checkpoint.display());
    } else {
        tracing::info!("Run incomplete or had failures, keeping checkpoint {}", paths.checkpoint.display());
    }

    tracing::info!(
        "Done model={} task={} language={}: {} new, {} failed, {} total successful",
        model,
        task.dir_name(),
        language,
        outcome.newly_successful,
        outcome.failed,
        outcome.total_successful
    );

    outcome
}

fn remove_checkpoint(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::info!("Removed checkpoint {}", path.display());
            true
        }
        Err(e) => {
            tracing::warn!("Could not remove checkpoint {}: {}", path.display(), e);
            false
        }
    }
}

/// Run the judge over every selected model, judged task and language
pub async fn run_judge_stage(
    config: &Config,
    executor: &JudgeExecutor,
    filter: &RunFilter,
    resume: bool,
) -> Vec<TaskRunOutcome> {
    let options = JudgeStageOptions {
        resume,
        ..JudgeStageOptions::from(config)
    };

    let tasks: Vec<TaskId> = match &filter.task {
        Some(name) => match name.parse::<TaskId>() {
            Ok(task) if task.is_judged() => vec![task],
            Ok(task) => {
                tracing::warn!("Task {} is not judged by an LLM", task.dir_name());
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("{}", e);
                return Vec::new();
            }
        },
        None => TaskId::judged(),
    };
    let languages: Vec<String> = match &filter.language {
        Some(language) => vec![language.clone()],
        None => Language::minority().iter().map(|l| l.code().to_string()).collect(),
    };

    let models = filter.models(&config.paths.predictions_dir);
    if models.is_empty() {
        tracing::warn!("No model directories under {}", config.paths.predictions_dir.display());
    }

    let mut outcomes = Vec::new();
    'models: for model in &models {
        for &task in &tasks {
            for language in &languages {
                if executor.is_cancelled() {
                    tracing::warn!("Cancellation requested, stopping judge stage");
                    break 'models;
                }
                outcomes.push(run_judge_task(executor, &config.paths, model, task, language, &options).await);
            }
        }
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::executor::tests::{fast_config, ScriptedProvider};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    const GOOD: &str = "知识准确性：4\n文化理解深度：4\n语言表达适切性：4\n内容完整性：4\n\
        内部视角真实性：4\n语言使用准确性：4\n分析总结：不错。\n最终分数：4";

    fn write(path: &Path, value: Value) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string(&value).unwrap()).unwrap();
    }

    fn setup(root: &Path, ids: &[&str]) -> PathsConfig {
        let dirs = PathsConfig {
            predictions_dir: root.join("pred"),
            extracted_dir: root.join("extracted"),
            judge_dir: root.join("judge"),
            test_data_dir: root.join("data"),
            output_dir: root.join("out"),
        };
        let test: Vec<Value> = ids
            .iter()
            .map(|id| json!({"id": id, "question": "问", "answer": "答"}))
            .collect();
        write(
            &dirs
                .test_data_dir
                .join("Chinese_Minority_Knowledge_Tasks/Minority_Culture_QA/bo.json"),
            Value::Array(test),
        );
        let preds: Vec<Value> = ids
            .iter()
            .map(|id| json!({"id": id, "gold": "答", "pred": "回答"}))
            .collect();
        write(
            &dirs
                .predictions_dir
                .join("m/Minority_Culture_QA/bo")
                .join(PREDICTION_FILE),
            Value::Array(preds),
        );
        dirs
    }

    fn options(resume: bool) -> JudgeStageOptions {
        JudgeStageOptions {
            resume,
            sample_size: None,
            sample_seed: 42,
            checkpoint_interval_items: 1,
            checkpoint_interval: Duration::from_secs(300),
        }
    }

    fn executor(provider: Arc<ScriptedProvider>) -> JudgeExecutor {
        JudgeExecutor::new(provider, fast_config(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_full_run_removes_checkpoint() {
        let root = tempfile::tempdir().unwrap();
        let dirs = setup(root.path(), &["1", "2", "3"]);
        let provider = Arc::new(ScriptedProvider::new(0, GOOD));

        let outcome = run_judge_task(
            &executor(provider.clone()),
            &dirs,
            "m",
            TaskId::TraditionalCulture,
            "bo",
            &options(false),
        )
        .await;

        assert_eq!(outcome.total_predictions, 3);
        assert_eq!(outcome.newly_successful, 3);
        assert_eq!(outcome.failed, 0);
        assert!(outcome.checkpoint_removed);

        let paths = JudgePaths::new(&dirs.judge_dir, "m", TaskId::TraditionalCulture, "bo");
        assert!(!paths.checkpoint.exists());
        let saved: Vec<Value> = serde_json::from_str(&fs::read_to_string(&paths.output).unwrap()).unwrap();
        assert_eq!(saved.len(), 3);
        assert_eq!(saved[0]["final_score"], json!(4.0));
        assert_eq!(saved[0]["knowledge_accuracy"], json!(4.0));
        assert_eq!(saved[0]["task_type"], json!("traditional_culture"));
    }

    #[tokio::test]
    async fn test_failures_are_logged_and_resumed() {
        let root = tempfile::tempdir().unwrap();
        let dirs = setup(root.path(), &["1", "2"]);
        let paths = JudgePaths::new(&dirs.judge_dir, "m", TaskId::TraditionalCulture, "bo");

        let unparsable = Arc::new(ScriptedProvider::new(0, "无法评分"));
        let first = run_judge_task(
            &executor(unparsable),
            &dirs,
            "m",
            TaskId::TraditionalCulture,
            "bo",
            &options(false),
        )
        .await;
        assert_eq!(first.failed, 2);
        assert_eq!(first.total_successful, 0);
        assert!(!paths.output.exists());

        let log = fs::read_to_string(&paths.error_log).unwrap();
        assert!(log.contains("错误信息: 验证失败"));
        let ids: Vec<String> = serde_json::from_str(&fs::read_to_string(&paths.error_ids).unwrap()).unwrap();
        assert_eq!(ids.len(), 2);

        let good = Arc::new(ScriptedProvider::new(0, GOOD));
        let second = run_judge_task(
            &executor(good.clone()),
            &dirs,
            "m",
            TaskId::TraditionalCulture,
            "bo",
            &options(true),
        )
        .await;
        assert_eq!(second.newly_successful, 2);
        assert!(second.checkpoint_removed);

        // Everything is already judged; nothing is sent to the provider
        let third = run_judge_task(
            &executor(good.clone()),
            &dirs,
            "m",
            TaskId::TraditionalCulture,
            "bo",
            &options(true),
        )
        .await;
        assert_eq!(third.total_successful, 2);
        assert_eq!(third.newly_successful, 0);
        assert_eq!(good.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_test_data_is_logged() {
        let root = tempfile::tempdir().unwrap();
        let dirs = setup(root.path(), &["1"]);
        let provider = Arc::new(ScriptedProvider::new(0, GOOD));

        let outcome = run_judge_task(
            &executor(provider.clone()),
            &dirs,
            "m",
            TaskId::TraditionalCulture,
            "mn",
            &options(false),
        )
        .await;

        assert_eq!(outcome.total_predictions, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        let paths = JudgePaths::new(&dirs.judge_dir, "m", TaskId::TraditionalCulture, "mn");
        assert!(fs::read_to_string(&paths.error_log).unwrap().contains("测试数据加载失败"));
    }

    #[tokio::test]
    async fn test_sampling_is_seeded() {
        let root = tempfile::tempdir().unwrap();
        let ids = ["1", "2", "3", "4", "5", "6"];
        let dirs = setup(root.path(), &ids);
        let provider = Arc::new(ScriptedProvider::new(0, GOOD));
        let opts = JudgeStageOptions {
            sample_size: Some(2),
            ..options(false)
        };

        let outcome = run_judge_task(
            &executor(provider.clone()),
            &dirs,
            "m",
            TaskId::TraditionalCulture,
            "bo",
            &opts,
        )
        .await;

        assert_eq!(outcome.newly_successful, 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(!outcome.checkpoint_removed);
    }

    #[tokio::test]
    async fn test_cancelled_stage_does_nothing() {
        let root = tempfile::tempdir().unwrap();
        let dirs = setup(root.path(), &["1"]);
        let provider = Arc::new(ScriptedProvider::new(0, GOOD));
        let exec = executor(provider.clone());
        exec.cancel_token().cancel();

        let config = Config {
            paths: dirs,
            ..Config::default()
        };
        let outcomes = run_judge_stage(&config, &exec, &RunFilter::default(), false).await;
        assert!(outcomes.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
