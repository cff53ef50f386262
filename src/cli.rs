use crate::config::RootConfig;
use crate::output::OutputFormat;
use crate::query::SearchMode;
use crate::source::ContainerId;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root name used when `--root` is given a bare directory.
pub const DEFAULT_ROOT_NAME: &str = "theme";

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Template directory to search, as NAME=DIR or DIR. Repeatable.
    #[clap(long = "root", value_parser = parse_root)]
    pub roots: Vec<RootConfig>,

    /// JSON document holding the records
    #[clap(long, value_parser)]
    pub records: Option<PathBuf>,

    /// Configuration file (defaults to the usual search locations)
    #[clap(long, value_parser)]
    pub config: Option<PathBuf>,

    #[clap(long, value_parser, default_value_t = false)]
    pub verbose: bool,

    #[clap(long, value_parser)]
    pub log: Option<PathBuf>,

    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[clap(long, value_parser)]
    pub max_files: Option<usize>,

    #[clap(long, value_parser)]
    pub max_records: Option<usize>,

    /// Print counters in Prometheus text format after the run
    #[clap(long, value_parser, default_value_t = false)]
    pub metrics: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    #[clap(long, value_enum, default_value_t = SearchMode::Literal)]
    pub mode: SearchMode,

    #[clap(long, value_parser, default_value_t = false)]
    pub case_sensitive: bool,

    /// Sources to search: posts, pages, cpt_<type>, meta, comments, files
    #[clap(long, value_parser, use_value_delimiter = true, default_value = "files")]
    pub scope: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Preview every match without changing anything
    Search {
        pattern: String,

        #[clap(flatten)]
        query: QueryArgs,
    },
    /// Search, then replace in the matching containers
    Replace {
        pattern: String,

        replacement: String,

        #[clap(flatten)]
        query: QueryArgs,

        /// Only replace in these containers (`#42`, `theme:header.php`)
        #[clap(long, value_parser = parse_container, use_value_delimiter = true)]
        select: Vec<ContainerId>,

        #[clap(long, value_parser, default_value_t = false)]
        dry_run: bool,

        /// Copy files here before rewriting them
        #[clap(long, value_parser)]
        backup_dir: Option<PathBuf>,
    },
}

fn parse_root(s: &str) -> Result<RootConfig, String> {
    let (name, path) = match s.split_once('=') {
        Some((name, path)) => (name.trim(), path),
        None => (DEFAULT_ROOT_NAME, s),
    };
    if name.is_empty() || path.is_empty() {
        return Err(format!("expected NAME=DIR, got '{s}'"));
    }
    Ok(RootConfig {
        name: name.to_string(),
        path: PathBuf::from(path),
    })
}

fn parse_container(s: &str) -> Result<ContainerId, String> {
    s.parse()
}
