//! Results reporting

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::analysis::{OverallRank, Rankings, ResultTree, SummaryRow, TaskRank};
use crate::runner::judge_stage::TaskRunOutcome;
use crate::runner::{write_json_atomic, CheckpointError, ExtractionRun};

pub const SUMMARY_CSV: &str = "evaluation_summary.csv";
pub const TASK_RANKING_CSV: &str = "task_ranking.csv";
pub const OVERALL_RANKING_CSV: &str = "model_overall_ranking.csv";
pub const RANKING_REPORT: &str = "ranking_report.txt";
pub const RESULTS_JSON: &str = "evaluation_results.json";

pub const PROCESSED_FILES_MAP: &str = "processed_files_map.json";
pub const FAILED_IDS_JSON: &str = "extraction_failed_ids.json";
pub const EXTRACTION_STATISTICS: &str = "extraction_statistics.json";
pub const EXTRACTION_REPORT: &str = "extraction_report.txt";

/// Failed ids listed per file before the report switches to a sample
const FAILED_ID_SAMPLE: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Write error: {0}")]
    Write(#[from] CheckpointError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

fn create(path: &Path) -> std::io::Result<BufWriter<File>> {
    ensure_parent(path)?;
    Ok(BufWriter::new(File::create(path)?))
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write one CSV table; the header comes from the row's serde names
fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), ReportError> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary_csv(path: &Path, rows: &[SummaryRow]) -> Result<(), ReportError> {
    write_csv(path, rows)
}

pub fn write_task_ranking_csv(path: &Path, rows: &[TaskRank]) -> Result<(), ReportError> {
    write_csv(path, rows)
}

pub fn write_overall_ranking_csv(path: &Path, rows: &[OverallRank]) -> Result<(), ReportError> {
    write_csv(path, rows)
}

/// Human-readable ranking report; task groups are listed by label
pub fn write_ranking_report(path: &Path, rankings: &Rankings) -> std::io::Result<()> {
    let mut file = create(path)?;

    writeln!(file, "模型排名报告")?;
    writeln!(file, "{:=<80}\n", "")?;

    writeln!(file, "综合排名:")?;
    writeln!(file, "{:-<80}", "")?;
    writeln!(file, "{:<6} {:<30} {:<10} {:<10} {:<10}", "排名", "模型名称", "综合得分", "平均排名", "评估任务数")?;
    for row in &rankings.overall {
        writeln!(
            file,
            "{:<6} {:<30} {:<10.2} {:<10.2} {:<10}",
            row.overall_rank, row.model, row.total_score, row.average_rank, row.tasks_evaluated
        )?;
    }

    writeln!(file, "\n\n任务级别排名:")?;
    writeln!(file, "{:=<80}", "")?;

    let mut grouped: BTreeMap<&str, Vec<&TaskRank>> = BTreeMap::new();
    for row in &rankings.task_rankings {
        grouped.entry(row.task_key.as_str()).or_default().push(row);
    }
    for (task_key, rows) in grouped {
        writeln!(file, "\n任务: {}", task_key)?;
        writeln!(file, "{:-<80}", "")?;
        writeln!(file, "{:<6} {:<30} {:<10} {:<10}", "排名", "模型名称", "得分", "指标")?;
        for row in rows {
            writeln!(file, "{:<6} {:<30} {:<10.4} {:<10}", row.rank, row.model, row.score, row.metric)?;
        }
    }

    file.flush()
}

/// Files written by [`write_evaluation_reports`]
#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    pub rankings: Rankings,
    pub summary_rows: usize,
    pub files: Vec<PathBuf>,
}

/// Write the summary table, both ranking tables, the text report and the raw
/// result tree. Tables with no rows are not written.
pub fn write_evaluation_reports(output_dir: &Path, tree: &ResultTree) -> Result<EvaluationReport, ReportError> {
    std::fs::create_dir_all(output_dir)?;
    let mut report = EvaluationReport::default();

    let results_path = output_dir.join(RESULTS_JSON);
    write_json_atomic(&results_path, tree)?;
    report.files.push(results_path);

    let rows = tree.summary_rows();
    report.summary_rows = rows.len();
    if !rows.is_empty() {
        let path = output_dir.join(SUMMARY_CSV);
        write_summary_csv(&path, &rows)?;
        report.files.push(path);
    }

    let rankings = tree.rankings();
    if !rankings.task_rankings.is_empty() {
        let path = output_dir.join(TASK_RANKING_CSV);
        write_task_ranking_csv(&path, &rankings.task_rankings)?;
        report.files.push(path);
    }
    if !rankings.overall.is_empty() {
        let path = output_dir.join(OVERALL_RANKING_CSV);
        write_overall_ranking_csv(&path, &rankings.overall)?;
        report.files.push(path);
    }

    let path = output_dir.join(RANKING_REPORT);
    write_ranking_report(&path, &rankings)?;
    report.files.push(path);

    for file in &report.files {
        tracing::info!("Wrote {}", file.display());
    }
    report.rankings = rankings;
    Ok(report)
}

fn percent(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

pub fn write_extraction_report(path: &Path, run: &ExtractionRun) -> std::io::Result<()> {
    let mut file = create(path)?;
    let by_model = run.by_model();

    writeln!(file, "提取统计报告")?;
    writeln!(file, "{:=<80}\n", "")?;

    writeln!(file, "模型级别汇总:")?;
    writeln!(file, "{:-<80}", "")?;
    writeln!(file, "{:<20} {:<10} {:<10} {:<10}", "模型名称", "总项目数", "提取失败数", "成功率")?;
    for (model, stats) in &by_model {
        writeln!(
            file,
            "{:<20} {:<10} {:<10} {}",
            model,
            stats.items.total_items,
            stats.items.failed_items,
            percent(stats.items.success_rate)
        )?;
    }

    writeln!(file, "\n\n详细统计:")?;
    writeln!(file, "{:=<80}", "")?;
    for (model, stats) in &by_model {
        writeln!(file, "\n模型: {}", model)?;
        writeln!(file, "{:-<80}", "")?;
        for (task, task_stats) in &stats.tasks {
            writeln!(
                file,
                "  任务: {} (总计: {}, 失败: {}, 成功率: {})",
                task,
                task_stats.items.total_items,
                task_stats.items.failed_items,
                percent(task_stats.items.success_rate)
            )?;
            for (language, lang_stats) in &task_stats.languages {
                writeln!(
                    file,
                    "    语言: {} (总计: {}, 失败: {}, 成功率: {})",
                    language,
                    lang_stats.total_items,
                    lang_stats.failed_items,
                    percent(lang_stats.success_rate)
                )?;
            }
        }
        writeln!(file)?;
    }

    writeln!(file, "\n\n提取失败ID统计:")?;
    writeln!(file, "{:=<80}", "")?;

    let mut models_with_failures = 0;
    for (model, tasks) in &run.failed_ids {
        let count = |files: &indexmap::IndexMap<String, Vec<String>>| files.values().map(Vec::len).sum::<usize>();
        let model_count: usize = tasks.values().flat_map(|langs| langs.values()).map(count).sum();
        if model_count == 0 {
            continue;
        }
        models_with_failures += 1;
        writeln!(file, "\n模型: {} (总失败ID数: {})", model, model_count)?;

        for (task, langs) in tasks {
            let task_count: usize = langs.values().map(count).sum();
            if task_count == 0 {
                continue;
            }
            writeln!(file, "  任务: {} (失败ID数: {})", task, task_count)?;

            for (language, files) in langs {
                let lang_count = count(files);
                if lang_count == 0 {
                    continue;
                }
                writeln!(file, "    语言: {} (失败ID数: {})", language, lang_count)?;

                for (file_name, ids) in files.iter().filter(|(_, ids)| !ids.is_empty()) {
                    writeln!(file, "      文件: {} (失败ID数: {})", file_name, ids.len())?;
                    if ids.len() > FAILED_ID_SAMPLE {
                        writeln!(
                            file,
                            "        失败ID示例(前{}个): {}...",
                            FAILED_ID_SAMPLE,
                            ids[..FAILED_ID_SAMPLE].join(", ")
                        )?;
                    } else {
                        writeln!(file, "        失败ID: {}", ids.join(", "))?;
                    }
                }
            }
        }
    }
    if models_with_failures == 0 {
        writeln!(file, "\n没有发现提取失败的ID！")?;
    }

    file.flush()
}

/// Write the extraction maps, statistics and text report into `output_dir`
pub fn write_extraction_reports(output_dir: &Path, run: &ExtractionRun) -> Result<Vec<PathBuf>, ReportError> {
    std::fs::create_dir_all(output_dir)?;
    let mut files = Vec::new();

    let path = output_dir.join(PROCESSED_FILES_MAP);
    write_json_atomic(&path, &run.processed_files)?;
    files.push(path);

    let path = output_dir.join(FAILED_IDS_JSON);
    write_json_atomic(&path, &run.failed_ids)?;
    files.push(path);

    let path = output_dir.join(EXTRACTION_STATISTICS);
    write_json_atomic(
        &path,
        &serde_json::json!({
            "by_model": run.by_model(),
            "raw_stats": run.raw_stats,
        }),
    )?;
    files.push(path);

    let path = output_dir.join(EXTRACTION_REPORT);
    write_extraction_report(&path, run)?;
    files.push(path);

    for file in &files {
        tracing::info!("Wrote {}", file.display());
    }
    Ok(files)
}

/// Generate a console report of the rankings
pub fn print_console_report(rankings: &Rankings) {
    println!("\n=== CMiLBench Evaluation Results ===\n");

    println!("Overall Ranking:");
    println!("{:-<50}", "");
    for row in &rankings.overall {
        println!(
            "  {}. {} - Total Score: {:.2}, Avg Rank: {:.2}, Tasks: {}",
            row.overall_rank, row.model, row.total_score, row.average_rank, row.tasks_evaluated
        );
    }

    if !rankings.task_rankings.is_empty() {
        println!("\nTask Leaders:");
        println!("{:-<50}", "");
        for row in rankings.task_rankings.iter().filter(|r| r.rank == 1) {
            println!("  {}: {} ({} {:.4})", row.task_key, row.model, row.metric, row.score);
        }
    }

    println!("\n{:=<50}", "");
}

pub fn print_extraction_summary(run: &ExtractionRun) {
    println!("\n=== Extraction Summary ===\n");
    println!(
        "Files: {} total, {} written, {} failed",
        run.total_files, run.written_files, run.failed_files
    );
    println!("{:-<50}", "");
    for (model, stats) in run.by_model() {
        println!(
            "  {} - Items: {}, Failed: {}, Success Rate: {}",
            model,
            stats.items.total_items,
            stats.items.failed_items,
            percent(stats.items.success_rate)
        );
    }
    println!("\n{:=<50}", "");
}

pub fn print_judge_summary(outcomes: &[TaskRunOutcome]) {
    println!("\n=== Judge Summary ===\n");
    println!("{:-<50}", "");
    for outcome in outcomes {
        let task = outcome.task.map(|t| t.dir_name()).unwrap_or("-");
        println!(
            "  {}/{}/{} - New: {}, Failed: {}, Successful: {}/{}{}",
            outcome.model,
            task,
            outcome.language,
            outcome.newly_successful,
            outcome.failed,
            outcome.total_successful,
            outcome.total_predictions,
            if outcome.cancelled { " (interrupted)" } else { "" }
        );
    }
    println!("\n{:=<50}", "");
}
