//! CLI parse: clap types for the copilot binary. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Copilot CLI - answer business questions over documents and a SQLite database
#[derive(Parser)]
#[command(name = "copilot")]
#[command(about = "Answer analytics questions from a document corpus and a read-only database")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Answer every question in a JSONL file
    Run {
        /// Input JSONL: {"id", "question", "format_hint"?} per line
        #[arg(long)]
        batch: PathBuf,
        /// Output JSONL path
        #[arg(long)]
        out: PathBuf,
        /// Questions answered at the same time (default from config)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Answer a single question
    Ask {
        question: String,
        /// Expected answer shape, e.g. int, float, list[{product:str}]
        #[arg(long)]
        format_hint: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Check database, corpus, few-shot artifact and model provider
    Diagnose {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the schema description given to the query generator
    Schema,
    /// Print the effective configuration
    Config,
}
