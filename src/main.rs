use colored::*;
use env_logger::{Builder, Env, Target};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rfsr::cli::{Cli, Commands, QueryArgs};
use rfsr::error::{Result as RfsrResult, RfsrError};
use rfsr::{Config, Engine, OutputFormatter, Parser, ReplaceItem, SearchQuery};
use std::fs;
use std::time::{Duration, Instant};

fn main() {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            std::process::exit(1);
        }
    }
}

/// Returns `false` when some replace items failed.
fn run(cli: &Cli) -> RfsrResult<bool> {
    setup_logging(cli)?;

    let start_time = Instant::now();
    info!("Application started with command: {:?}", cli.command);

    let config = load_config(cli)?;
    let engine = Engine::from_config(&config)?;
    let formatter = OutputFormatter::new(cli.format);

    let pb = ProgressBar::new_spinner().with_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut failed = false;
    match &cli.command {
        Commands::Search { pattern, query } => {
            pb.set_message(format!("Searching for '{pattern}'..."));
            let report = engine.search(&build_query(pattern, query));
            pb.finish_and_clear();
            println!("{}", formatter.format_report(&report?)?);
        }
        Commands::Replace {
            pattern,
            replacement,
            query,
            select,
            dry_run,
            ..
        } => {
            let query = build_query(pattern, query);
            pb.set_message(format!("Searching for '{pattern}'..."));
            let report = engine.search(&query)?;

            let items: Vec<ReplaceItem> = if select.is_empty() {
                report.results().map(ReplaceItem::from).collect()
            } else {
                select
                    .iter()
                    .map(|id| {
                        report
                            .results()
                            .find(|r| &r.container_id == id)
                            .map(ReplaceItem::from)
                            .unwrap_or_else(|| ReplaceItem::new(id.clone()))
                    })
                    .collect()
            };

            if items.is_empty() {
                pb.finish_and_clear();
                println!("{}", formatter.format_report(&report)?);
            } else if *dry_run {
                pb.set_message(format!("Previewing {} item(s)...", items.len()));
                let preview = engine.preview_replace(&query, replacement, &items)?;
                pb.finish_and_clear();
                println!("{}", formatter.format_preview(&preview)?);
            } else {
                pb.set_message(format!("Replacing in {} item(s)...", items.len()));
                let outcome = engine.replace(&query, replacement, &items)?;
                pb.finish_and_clear();
                println!("{}", formatter.format_outcome(&outcome)?);

                let backups = engine.backups();
                if !backups.is_empty() {
                    println!(
                        "{} {} file(s) backed up",
                        "Backups:".cyan(),
                        backups.len()
                    );
                }
                if !outcome.failures.is_empty() {
                    warn!("{} item(s) could not be replaced", outcome.items_failed());
                    failed = true;
                }
            }
        }
    }

    if cli.metrics {
        print!("{}", engine.metrics().gather());
    }

    info!(
        "Application finished. Total elapsed time: {:.2?}",
        start_time.elapsed()
    );
    Ok(!failed)
}

fn build_query(pattern: &str, args: &QueryArgs) -> SearchQuery {
    SearchQuery::new(pattern)
        .mode(args.mode)
        .case_sensitive(args.case_sensitive)
        .scope(args.scope.iter().cloned())
}

/// Configuration file values, overridden by command-line flags.
fn load_config(cli: &Cli) -> RfsrResult<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if !cli.roots.is_empty() {
        config.files.roots = cli.roots.clone();
    }
    if let Some(records) = &cli.records {
        config.records.store = Some(records.clone());
    }
    if let Some(max) = cli.max_files {
        config.limits.max_files = max;
    }
    if let Some(max) = cli.max_records {
        config.limits.max_records = max;
    }
    if let Commands::Replace {
        backup_dir: Some(dir),
        ..
    } = &cli.command
    {
        config.files.backup_dir = Some(dir.clone());
    }
    Ok(config)
}

fn setup_logging(cli: &Cli) -> RfsrResult<()> {
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));

    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "{} [{}] [{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.module_path().unwrap_or("unknown"),
            record.args()
        )
    });

    if let Some(log_path) = &cli.log {
        if let Some(parent_dir) = log_path.parent() {
            if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                fs::create_dir_all(parent_dir).map_err(RfsrError::Io)?;
            }
        }
        let log_file = fs::File::create(log_path).map_err(RfsrError::Io)?;
        builder.target(Target::Pipe(Box::new(log_file)));
    } else {
        builder.target(Target::Stderr);
    }

    builder
        .try_init()
        .map_err(|e| RfsrError::Other(e.to_string()))?;
    Ok(())
}
