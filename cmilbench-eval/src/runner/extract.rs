//! Extraction stage: raw predictions to extracted files plus run statistics

use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;

use super::checkpoint::write_json_atomic;
use super::{list_json_files, RunFilter};
use crate::extraction::{process_file, FileStats};
use crate::tasks::TaskId;

type Nested<T> = IndexMap<String, IndexMap<String, IndexMap<String, T>>>;

/// One successfully written extracted file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedFile {
    pub file_name: String,
    pub item_count: usize,
    pub extraction_failed_count: usize,
    pub success_rate: f64,
}

/// Item counts rolled up over files
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemRollup {
    pub total_items: usize,
    pub failed_items: usize,
    pub success_rate: f64,
}

impl ItemRollup {
    fn add(&mut self, other: &ItemRollup) {
        self.total_items += other.total_items;
        self.failed_items += other.failed_items;
    }

    fn finish(mut self) -> Self {
        self.success_rate = if self.total_items == 0 {
            0.0
        } else {
            (self.total_items - self.failed_items) as f64 / self.total_items as f64
        };
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskRollup {
    #[serde(flatten)]
    pub items: ItemRollup,
    pub languages: IndexMap<String, ItemRollup>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelRollup {
    #[serde(flatten)]
    pub items: ItemRollup,
    pub tasks: IndexMap<String, TaskRollup>,
}

/// Everything the extraction stage learned, keyed `model -> task -> language`
#[derive(Debug, Clone, Default)]
pub struct ExtractionRun {
    pub processed_files: Nested<Vec<ProcessedFile>>,
    /// Only files with at least one failed extraction
    pub failed_ids: Nested<IndexMap<String, Vec<String>>>,
    pub raw_stats: Nested<IndexMap<String, FileStats>>,
    pub total_files: usize,
    pub written_files: usize,
    pub failed_files: usize,
}

impl ExtractionRun {
    fn record(&mut self, model: &str, task: &str, lang: &str, file: &str, stats: FileStats) {
        if !stats.extraction_failed_ids.is_empty() {
            nested_entry(&mut self.failed_ids, model, task, lang)
                .insert(file.to_string(), stats.extraction_failed_ids.clone());
        }
        nested_entry(&mut self.raw_stats, model, task, lang).insert(file.to_string(), stats);
    }

    /// Per model, task and language totals over processed items
    pub fn by_model(&self) -> IndexMap<String, ModelRollup> {
        self.raw_stats
            .iter()
            .map(|(model, tasks)| {
                let mut model_rollup = ModelRollup::default();
                for (task, langs) in tasks {
                    let mut task_rollup = TaskRollup::default();
                    for (lang, files) in langs {
                        let mut lang_rollup = ItemRollup::default();
                        for stats in files.values() {
                            lang_rollup.total_items += stats.processed_items;
                            lang_rollup.failed_items += stats.extraction_failed_items;
                        }
                        task_rollup.items.add(&lang_rollup);
                        task_rollup.languages.insert(lang.clone(), lang_rollup.finish());
                    }
                    model_rollup.items.add(&task_rollup.items);
                    task_rollup.items = task_rollup.items.finish();
                    model_rollup.tasks.insert(task.clone(), task_rollup);
                }
                model_rollup.items = model_rollup.items.finish();
                (model.clone(), model_rollup)
            })
            .collect()
    }
}

fn nested_entry<'a, T: Default>(
    map: &'a mut Nested<T>,
    model: &str,
    task: &str,
    lang: &str,
) -> &'a mut T {
    map.entry(model.to_string())
        .or_default()
        .entry(task.to_string())
        .or_default()
        .entry(lang.to_string())
        .or_default()
}

/// Extract every prediction file under `input_dir` into `output_dir`.
///
/// Layout on both sides is `<model>/<TaskDir>/<lang>/<file>.json`. Unknown
/// task directories are skipped; unreadable files are counted as failed.
pub fn run_extraction(input_dir: &Path, output_dir: &Path, filter: &RunFilter) -> ExtractionRun {
    let mut run = ExtractionRun::default();

    for model in filter.models(input_dir) {
        let model_dir = input_dir.join(&model);
        if !model_dir.is_dir() {
            continue;
        }
        tracing::info!("Extracting model: {}", model);

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

            for lang in filter.languages(&task_path) {
                let lang_path = task_path.join(&lang);
                if !lang_path.is_dir() {
                    continue;
                }

                for file_name in list_json_files(&lang_path) {
                    run.total_files += 1;
                    let (extracted, stats) = match process_file(lang_path.join(&file_name), task) {
                        Ok(result) => result,
                        Err(e) => {
                            tracing::warn!("Failed to process {}/{}/{}/{}: {}", model, task_dir, lang, file_name, e);
                            (Vec::new(), FileStats::from_error(e))
                        }
                    };

                    let failed_count = stats.extraction_failed_items;
                    let success_rate = stats.success_rate;
                    run.record(&model, &task_dir, &lang, &file_name, stats);

                    if extracted.is_empty() {
                        tracing::warn!("No usable data in {}/{}/{}/{}", model, task_dir, lang, file_name);
                        run.failed_files += 1;
                        continue;
                    }

                    let out_path = output_dir.join(&model).join(&task_dir).join(&lang).join(&file_name);
                    if let Err(e) = write_json_atomic(&out_path, &extracted) {
                        tracing::error!("Failed to write {}: {}", out_path.display(), e);
                        run.failed_files += 1;
                        continue;
                    }

                    run.written_files += 1;
                    nested_entry(&mut run.processed_files, &model, &task_dir, &lang).push(ProcessedFile {
                        file_name: file_name.clone(),
                        item_count: extracted.len(),
                        extraction_failed_count: failed_count,
                        success_rate,
                    });
                    tracing::info!(
                        "    {}/{}: {} items, {} failed, {:.2}% extracted",
                        lang,
                        file_name,
                        extracted.len(),
                        failed_count,
                        success_rate * 100.0
                    );
                }
            }
        }
    }

    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::load_extracted_records;
    use serde_json::json;

    fn write(path: &Path, value: serde_json::Value) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string(&value).unwrap()).unwrap();
    }

    #[test]
    fn test_extraction_walks_tree() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        write(
            &input.path().join("m1/Math_Reasoning/bo/zh-prompt_test.json"),
            json!([
                {"id": "1", "gold": "3", "pred": "答案是 3"},
                {"id": "2", "gold": "4", "pred": "不会"}
            ]),
        );
        write(&input.path().join("m1/Unknown_Task/bo/x.json"), json!([]));
        write(&input.path().join("m1/Math_Reasoning/mn/broken.json"), json!({"not": "array"}));

        let run = run_extraction(input.path(), output.path(), &RunFilter::default());

        assert_eq!(run.total_files, 2);
        assert_eq!(run.written_files, 1);
        assert_eq!(run.failed_files, 1);
        assert_eq!(
            run.failed_ids["m1"]["Math_Reasoning"]["bo"]["zh-prompt_test.json"],
            vec!["2".to_string()]
        );
        assert!(run.raw_stats["m1"]["Math_Reasoning"]["mn"]["broken.json"].error.is_some());

        let extracted = load_extracted_records(
            output.path().join("m1/Math_Reasoning/bo/zh-prompt_test.json"),
        )
        .unwrap();
        assert_eq!(extracted[0].answer, "3");
        assert!(!extracted[1].extraction_success);

        let rollup = &run.by_model()["m1"];
        assert_eq!(rollup.items.total_items, 2);
        assert_eq!(rollup.items.failed_items, 1);
        assert!((rollup.tasks["Math_Reasoning"].languages["bo"].success_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_filter_limits_languages() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let item = json!([{"id": "1", "gold": "A", "pred": "A"}]);
        write(&input.path().join("m/Coreference_Resolution/bo/f.json"), item.clone());
        write(&input.path().join("m/Coreference_Resolution/ug/f.json"), item);

        let filter = RunFilter {
            language: Some("ug".to_string()),
            ..Default::default()
        };
        let run = run_extraction(input.path(), output.path(), &filter);
        assert_eq!(run.written_files, 1);
        assert!(output.path().join("m/Coreference_Resolution/ug/f.json").exists());
        assert!(!output.path().join("m/Coreference_Resolution/bo/f.json").exists());
    }
}
