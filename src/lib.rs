pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod metrics;
pub mod output;
pub mod preview;
pub mod query;
pub mod replace;
pub mod scanner;
pub mod source;
pub mod walker;

pub use clap::Parser;
pub use cli::{Cli, Commands, QueryArgs};
pub use config::Config;
pub use engine::{Engine, SearchReport};
pub use error::{Result, RfsrError, ValidationError};
pub use matcher::Matcher;
pub use output::{OutputFormat, OutputFormatter};
pub use query::{Scope, SearchMode, SearchQuery, SourceKind};
pub use replace::{ItemStatus, ReplaceItem, ReplaceOutcome, ReplacePreview, ReplaceWarning};
pub use scanner::{FieldMatch, MatchResult, SourceReport, SourceWarning};
pub use source::{ContainerId, ContentSource};
