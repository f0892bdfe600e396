//! Dirwatch CLI - Command-line interface for dirwatch
//!
//! Watches directories and prints what changed, scans a tree once,
//! and reports which change sources this machine supports.

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use dirwatch_watcher::SourceKind;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "dirwatch")]
#[command(author = "Dirwatch Contributors")]
#[command(version)]
#[command(about = "Watch directory trees for added, modified and removed files", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default dirwatch.json in a directory
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Watch directories and print change events until Ctrl+C
    Watch {
        #[command(flatten)]
        options: WatchArgs,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Scan once and list what would be watched
    Scan {
        #[command(flatten)]
        options: WatchArgs,
    },

    /// Show which change sources are available here
    Backends,
}

/// Options shared by `watch` and `scan`; they override the config file.
#[derive(Args, Debug, Default)]
pub struct WatchArgs {
    /// Directories to watch (defaults to the config file's roots, then ".")
    pub paths: Vec<PathBuf>,

    /// Config file (defaults to ./dirwatch.json, then the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Polling interval in milliseconds
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Only record files matching this glob (repeatable)
    #[arg(long)]
    pub include: Vec<String>,

    /// Never record files matching this glob (repeatable)
    #[arg(short, long)]
    pub exclude: Vec<String>,

    /// Maximum recursion depth
    #[arg(short = 'd', long)]
    pub max_depth: Option<usize>,

    /// Change source: auto, polling or native
    #[arg(short, long)]
    pub source: Option<SourceKind>,

    /// Don't report files that exist when watching starts
    #[arg(long)]
    pub pre_load: bool,

    /// Report files as stable after this many quiet cycles
    #[arg(long)]
    pub stable: Option<u32>,

    /// Keep the snapshot in this file between runs
    #[arg(long)]
    pub persist: Option<PathBuf>,

    /// Follow symbolic links
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip dotfiles
    #[arg(long)]
    pub skip_hidden: bool,

    /// Respect .gitignore files
    #[arg(long)]
    pub git_ignore: bool,

    /// Record directories too
    #[arg(long)]
    pub include_dirs: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let result = match cli.command {
        Commands::Init { path } => commands::init(&path),
        Commands::Watch { options, json } => commands::watch(options, json).await,
        Commands::Scan { options } => commands::scan(options),
        Commands::Backends => commands::backends(),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
