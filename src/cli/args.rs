use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "scribehook")]
#[command(about = "Meeting transcript pipeline for scheduling-platform webhooks", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config.toml (default: <config_dir>/scribehook/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the webhook server (default)
    Serve,
    /// Fetch a transcript from the platform API for one record
    Retry(RetryCliArgs),
    /// Inspect stored transcript records
    Transcripts(TranscriptsCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct RetryCliArgs {
    /// Internal transcript id
    pub id: String,
}

#[derive(ClapArgs, Debug)]
pub struct TranscriptsCliArgs {
    #[command(subcommand)]
    pub command: TranscriptsCommand,
}

#[derive(Subcommand, Debug)]
pub enum TranscriptsCommand {
    /// List the most recent records
    List {
        /// Maximum number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show one record in full
    Show {
        /// Internal transcript id
        id: String,
    },
}
