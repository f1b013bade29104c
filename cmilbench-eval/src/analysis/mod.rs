//! Scoring, judge parsing and aggregation

pub mod aggregator;
pub mod judge;
pub mod metrics;
pub mod text_metrics;
pub mod tokenize;

pub use aggregator::{OverallRank, Rankings, ResultTree, ScoreType, SummaryRow, TaskRank};
pub use judge::{
    is_failure_sentinel, parse_verdict, AnswerType, Dimension, JudgeRecord, JudgeSchema,
    JudgeVerdict,
};
pub use metrics::{is_correct, FileContext, MetricDispatcher, ScoreRecord, UNKNOWN_CATEGORY};
pub use text_metrics::{corpus_bleu, corpus_chrf, rouge_l};
