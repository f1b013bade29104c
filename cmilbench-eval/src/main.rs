//! CMiLBench evaluation CLI

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cmilbench_eval::{
    config::Config,
    providers::create_judge_provider,
    reporting::{
        print_console_report, print_extraction_summary, print_judge_summary, write_evaluation_reports,
        write_extraction_reports,
    },
    runner::{run_evaluation, run_extraction, run_judge_stage, ExecutorConfig, JudgeExecutor, RunFilter},
    tasks::{Language, TaskId},
};

#[derive(Parser)]
#[command(name = "cmilbench-eval")]
#[command(about = "Answer extraction, scoring and ranking for the CMiLBench benchmark")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Restrict a stage to one model, task or language
#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    /// Model directory name
    #[arg(short, long)]
    model: Option<String>,

    /// Task directory name (e.g. Math_Reasoning) or id (e.g. math_reasoning)
    #[arg(short, long)]
    task: Option<String>,

    /// Language code (bo, mn, ug, zh)
    #[arg(short, long)]
    language: Option<String>,
}

impl From<FilterArgs> for RunFilter {
    fn from(args: FilterArgs) -> Self {
        RunFilter {
            model: args.model,
            task: args.task,
            language: args.language,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract answers from raw model predictions
    Extract {
        #[command(flatten)]
        filter: FilterArgs,

        /// Predictions directory (default: paths.predictions_dir)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Extracted output directory (default: paths.extracted_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Score extracted answers and write summary and ranking reports
    Evaluate {
        #[command(flatten)]
        filter: FilterArgs,

        /// Extracted directory (default: paths.extracted_dir)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Judge results directory (default: paths.judge_dir)
        #[arg(long)]
        judge_dir: Option<PathBuf>,

        /// Report directory (default: paths.output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the LLM judge over open-ended tasks
    Judge {
        #[command(flatten)]
        filter: FilterArgs,

        /// Skip ids already judged successfully
        #[arg(long)]
        resume: bool,

        /// Judge a seeded random sample of pending items per task
        #[arg(long)]
        sample_size: Option<usize>,

        /// Concurrent judge calls
        #[arg(long)]
        workers: Option<usize>,
    },

    /// List tasks with their scoring metadata
    ListTasks,

    /// Generate sample configuration
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config/cmilbench.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("cmilbench_eval=debug,info")
    } else {
        EnvFilter::new("cmilbench_eval=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default(),
    };

    match cli.command {
        Commands::Extract { filter, input, output } => {
            let input = input.unwrap_or_else(|| config.paths.predictions_dir.clone());
            let output = output.unwrap_or_else(|| config.paths.extracted_dir.clone());
            extract(input, output, filter.into())?;
        }

        Commands::Evaluate {
            filter,
            input,
            judge_dir,
            output,
        } => {
            let input = input.unwrap_or_else(|| config.paths.extracted_dir.clone());
            let judge_dir = judge_dir.unwrap_or_else(|| config.paths.judge_dir.clone());
            let output = output.unwrap_or_else(|| config.paths.output_dir.clone());
            evaluate(input, judge_dir, output, filter.into())?;
        }

        Commands::Judge {
            filter,
            resume,
            sample_size,
            workers,
        } => {
            let mut config = config;
            if sample_size.is_some() {
                config.runner.sample_size = sample_size;
            }
            if let Some(workers) = workers {
                config.runner.max_workers = workers;
            }
            judge(config, filter.into(), resume).await?;
        }

        Commands::ListTasks => {
            list_tasks();
        }

        Commands::InitConfig { output } => {
            init_config(output)?;
        }
    }

    Ok(())
}

fn extract(input: PathBuf, output: PathBuf, filter: RunFilter) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== CMiLBench Answer Extraction ===");
    println!("Input:  {}", input.display());
    println!("Output: {}", output.display());
    println!();

    if !input.is_dir() {
        eprintln!("Error: predictions directory not found: {}", input.display());
        std::process::exit(1);
    }

    let run = run_extraction(&input, &output, &filter);
    write_extraction_reports(&output, &run)?;
    print_extraction_summary(&run);
    Ok(())
}

fn evaluate(
    input: PathBuf,
    judge_dir: PathBuf,
    output: PathBuf,
    filter: RunFilter,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== CMiLBench Evaluation ===");
    println!("Input:  {}", input.display());
    println!("Judge:  {}", judge_dir.display());
    println!("Output: {}", output.display());
    println!();

    if !input.is_dir() {
        eprintln!("Error: extracted directory not found: {}", input.display());
        std::process::exit(1);
    }

    let tree = run_evaluation(&input, Some(&judge_dir), &filter);
    if tree.is_empty() {
        tracing::warn!("No results were produced");
    }

    let report = write_evaluation_reports(&output, &tree)?;
    print_console_report(&report.rankings);
    println!("Reports written to: {}", output.display());
    Ok(())
}

async fn judge(config: Config, filter: RunFilter, resume: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== CMiLBench LLM Judge ===");
    println!("Judge model: {} @ {}", config.judge.model, config.judge.base_url);
    println!("Workers: {}", config.runner.max_workers);
    println!();

    let provider = create_judge_provider(&config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight items and saving progress");
            on_signal.cancel();
        }
    });

    let executor = JudgeExecutor::new(provider, ExecutorConfig::from(&config), cancel);
    let outcomes = run_judge_stage(&config, &executor, &filter, resume).await;
    print_judge_summary(&outcomes);

    if executor.is_cancelled() {
        println!("Interrupted; rerun with --resume to continue.");
    }
    Ok(())
}

fn list_tasks() {
    println!("Available Tasks ({}):", TaskId::ALL.len());
    println!("{:-<60}", "");

    for task in TaskId::ALL {
        println!(
            "  {} | {} | {:?} | {:?}{}",
            task.dir_name(),
            task.id(),
            task.answer_kind(),
            task.family(),
            if task.is_judged() { " | judged" } else { "" }
        );
    }

    let languages: Vec<String> = Language::all()
        .iter()
        .map(|l| format!("{} ({})", l.code(), l.script_name()))
        .collect();
    println!("\nLanguages: {}", languages.join(", "));
}

fn init_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    config.save_toml(&output)?;
    println!("Configuration written to: {}", output.display());
    Ok(())
}
