//! Pipeline stages: extraction, evaluation and the LLM-judge run

pub mod checkpoint;
pub mod evaluate;
pub mod executor;
pub mod extract;
pub mod judge_stage;
pub mod prompt;
pub mod rate_limiter;

pub use checkpoint::{write_json_atomic, CheckpointError, ResumeState, RunDescriptor};
pub use evaluate::{evaluate_file, run_evaluation};
pub use executor::{ExecutorConfig, JudgeExecutor};
pub use extract::{run_extraction, ExtractionRun};
pub use judge_stage::{run_judge_stage, run_judge_task, JudgeStageOptions, TaskRunOutcome};
pub use prompt::{build_judge_prompt, JudgeInput};
pub use rate_limiter::RateLimiter;

use std::path::Path;

use crate::tasks::TaskId;

/// Optional model/task/language restriction shared by every stage
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub model: Option<String>,
    /// Directory name or internal id
    pub task: Option<String>,
    pub language: Option<String>,
}

impl RunFilter {
    /// Model directories under `root`, or just the requested model
    pub fn models(&self, root: &Path) -> Vec<String> {
        match &self.model {
            Some(model) => vec![model.clone()],
            None => list_subdirs(root),
        }
    }

    /// Task directories under a model directory, or just the requested task
    pub fn tasks(&self, model_dir: &Path) -> Vec<String> {
        match &self.task {
            Some(task) => vec![task
                .parse::<TaskId>()
                .map(|t| t.dir_name().to_string())
                .unwrap_or_else(|_| task.clone())],
            None => list_subdirs(model_dir),
        }
    }

    /// Language directories under a task directory, or just the requested language
    pub fn languages(&self, task_dir: &Path) -> Vec<String> {
        match &self.language {
            Some(language) => vec![language.clone()],
            None => list_subdirs(task_dir),
        }
    }
}

/// Sorted names of the subdirectories of `dir`; a missing directory has none
pub fn list_subdirs(dir: &Path) -> Vec<String> {
    list_entries(dir, |path| path.is_dir())
}

/// Sorted names of the `.json` files in `dir`
pub fn list_json_files(dir: &Path) -> Vec<String> {
    list_entries(dir, |path| {
        path.is_file() && path.extension().is_some_and(|ext| ext == "json")
    })
}

fn list_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> Vec<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Cannot list {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| keep(&entry.path()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("b")).unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::write(dir.path().join("z.json"), "[]").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        assert_eq!(list_subdirs(dir.path()), vec!["a", "b"]);
        assert_eq!(list_json_files(dir.path()), vec!["z.json"]);
        assert!(list_subdirs(&dir.path().join("missing")).is_empty());
    }

    #[test]
    fn test_filter_normalizes_task_id() {
        let filter = RunFilter {
            task: Some("math_reasoning".to_string()),
            ..Default::default()
        };
        assert_eq!(filter.tasks(Path::new("/nowhere")), vec!["Math_Reasoning"]);
    }
}
