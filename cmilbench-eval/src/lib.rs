//! Evaluation harness for the CMiLBench minority-language benchmark
//!
//! This crate turns raw model predictions into benchmark scores and rankings
//! for Chinese and the minority languages Tibetan, Mongolian and Uyghur.
//!
//! # Features
//!
//! - Answer extraction for choice, numeric, classification and free-text tasks
//! - Accuracy, ROUGE-L, chrF++, BLEU and LLM-judge scores per result file
//! - Resumable LLM-judge runs against an OpenAI-compatible endpoint
//! - Per-task and overall model rankings with CSV and text reports
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use cmilbench_eval::{
//!     reporting::write_evaluation_reports,
//!     runner::{run_evaluation, run_extraction, RunFilter},
//! };
//!
//! let filter = RunFilter::default();
//! run_extraction(Path::new("results/predictions"), Path::new("results/extracted"), &filter);
//!
//! let tree = run_evaluation(
//!     Path::new("results/extracted"),
//!     Some(Path::new("results/llm_evaluation")),
//!     &filter,
//! );
//! let report = write_evaluation_reports(Path::new("results/evaluation"), &tree).unwrap();
//! println!("{} models ranked", report.rankings.overall.len());
//! ```

pub mod analysis;
pub mod config;
pub mod extraction;
pub mod providers;
pub mod reporting;
pub mod runner;
pub mod tasks;

pub use config::Config;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::analysis::{
        parse_verdict, JudgeSchema, JudgeVerdict, MetricDispatcher, Rankings, ResultTree,
        ScoreRecord,
    };
    pub use crate::config::Config;
    pub use crate::extraction::{extract_answer, process_file, ExtractionResult, FileStats};
    pub use crate::providers::{
        create_judge_provider, CompletionRequest, CompletionResponse, LLMProvider, Message,
        ProviderError, ProviderResult,
    };
    pub use crate::reporting::{print_console_report, write_evaluation_reports, write_extraction_reports};
    pub use crate::runner::{
        run_evaluation, run_extraction, run_judge_stage, ExecutorConfig, JudgeExecutor, RunFilter,
    };
    pub use crate::tasks::{ExtractedRecord, Language, PredictionRecord, TaskId};
}
