//! CLI command implementations.

use crate::WatchArgs;
use colored::Colorize;
use dirwatch_core::{Event, EventKind};
use dirwatch_watcher::{
    available_sources, ListenerError, Scanner, SnapshotCollector, SourceKind, WatchConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Name of the per-directory config file.
const CONFIG_FILE: &str = "dirwatch.json";

/// Write a default config file.
pub fn init(path: &Path) -> Result<()> {
    let config_path = path.join(CONFIG_FILE);

    if config_path.exists() {
        println!("{} Already initialized", "✓".green());
        return Ok(());
    }

    fs::create_dir_all(path)?;

    let default_config = WatchConfig {
        roots: vec![PathBuf::from(".")],
        exclude: vec![
            ".git".to_string(),
            "target".to_string(),
            "node_modules".to_string(),
        ],
        ..WatchConfig::default()
    };
    fs::write(&config_path, serde_json::to_string_pretty(&default_config)?)?;

    println!("{} Wrote {}", "✓".green(), config_path.display());
    println!("  Run {} to start watching", "dirwatch watch".cyan());

    Ok(())
}

/// Watch until Ctrl+C, printing each batch.
pub async fn watch(args: WatchArgs, json: bool) -> Result<()> {
    let config = build_config(args)?;
    let scanner = Arc::new(Scanner::new(config)?);

    scanner.subscribe(move |events: &[Event]| -> std::result::Result<(), ListenerError> {
        print_events(events, json)
    });

    scanner.start()?;

    let roots: Vec<_> = scanner.roots().map(|r| r.display().to_string()).collect();
    eprintln!("{} Watching {}", "✓".green(), roots.join(", ").cyan());
    eprintln!("  Press {} to stop", "Ctrl+C".cyan());

    tokio::signal::ctrl_c().await?;

    // stop() joins the scanner thread; keep it off the async workers
    let stopper = scanner.clone();
    tokio::task::spawn_blocking(move || stopper.stop()).await?;

    eprintln!("{} Stopped", "✓".green());
    Ok(())
}

/// Scan once and list every recorded entry.
pub fn scan(args: WatchArgs) -> Result<()> {
    let config = build_config(args)?.absolutize()?;
    let collector = SnapshotCollector::new(&config)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message("Scanning files...");

    let start = Instant::now();
    let snapshot = collector.collect()?;
    let elapsed = start.elapsed();

    spinner.finish_and_clear();

    for (path, stat) in snapshot.iter() {
        println!("  {:<8} {}", format!("{:?}", stat.kind).dimmed(), path.display());
    }
    println!(
        "{} Found {} entries in {}ms",
        "✓".green(),
        snapshot.len().to_string().cyan(),
        elapsed.as_millis()
    );

    Ok(())
}

/// Show available change sources.
pub fn backends() -> Result<()> {
    let available = available_sources();

    println!("{}", "Change sources".cyan().bold());
    for kind in [SourceKind::Polling, SourceKind::Native] {
        let mark = if available.contains(&kind) {
            "✓".green()
        } else {
            "✗".red()
        };
        println!("  {} {}", mark, kind);
    }
    println!(
        "  {} {}",
        "auto resolves to".dimmed(),
        SourceKind::Auto.resolve()
    );

    Ok(())
}

/// Loads the config file (if any) and applies command-line overrides.
fn build_config(args: WatchArgs) -> Result<WatchConfig> {
    let mut config = match find_config(args.config.as_deref()) {
        Some(path) => {
            tracing::debug!("Loading config from {}", path.display());
            WatchConfig::from_file(&path)?
        }
        None => WatchConfig::default(),
    };

    if !args.paths.is_empty() {
        config.roots = args.paths;
    }
    if config.roots.is_empty() {
        config.roots.push(PathBuf::from("."));
    }
    if let Some(interval) = args.interval {
        config.interval_ms = interval;
    }
    config.include.extend(args.include);
    config.exclude.extend(args.exclude);
    if args.max_depth.is_some() {
        config.max_depth = args.max_depth;
    }
    if let Some(source) = args.source {
        config.source = source;
    }
    if args.stable.is_some() {
        config.stable = args.stable;
    }
    if args.persist.is_some() {
        config.persist = args.persist;
    }
    config.pre_load |= args.pre_load;
    config.follow_symlinks |= args.follow_symlinks;
    config.skip_hidden |= args.skip_hidden;
    config.git_ignore |= args.git_ignore;
    config.include_dirs |= args.include_dirs;

    config.validate()?;
    Ok(config)
}

fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("dirwatch").join(CONFIG_FILE))
        .filter(|path| path.exists())
}

fn print_events(events: &[Event], json: bool) -> std::result::Result<(), ListenerError> {
    for event in events {
        if json {
            println!("{}", serde_json::to_string(event)?);
            continue;
        }

        let tag = match event.kind {
            EventKind::Added => "+".green(),
            EventKind::Modified => "~".yellow(),
            EventKind::Removed => "-".red(),
            EventKind::Stable => "=".cyan(),
        };
        println!("{} {}", tag, event.path.display());
    }
    Ok(())
}
