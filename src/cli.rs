use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Filter structured log files with a small expression language
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML config with field rules and saved filters
    #[arg(short = 'c', long, global = true, env = "LOG_FILTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'F', long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Also write the output to this file
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// When to use colors
    #[arg(long, global = true, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the entries of one or more log files that match a filter
    Search {
        /// Log files to search
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Filter expression, e.g. 'level == "ERROR" AND "timeout"'
        #[arg(short, long)]
        filter: String,

        /// Number of surrounding entries to show around each match
        #[arg(short = 'C', long, default_value_t = 0)]
        context: usize,

        /// Print only the number of matching entries
        #[arg(long)]
        count: bool,
    },
    /// Parse a filter and show its canonical form and dependencies
    Check {
        /// Filter expression to check
        filter: String,
    },
    /// List the saved filters from the config
    Library,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

impl Cli {
    /// Max log level for the diagnostic subscriber
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            return tracing::Level::ERROR;
        }
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

pub fn cli_parse() -> Cli {
    Cli::parse()
}
