use crate::source::records::RecordStatus;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub files: FilesConfig,

    #[serde(default)]
    pub records: RecordsConfig,

    #[serde(default)]
    pub preview: PreviewConfig,
}

/// Caps applied by the scanner to each source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_max_records() -> usize {
    100
}
fn default_max_files() -> usize {
    500
}
fn default_parallel() -> bool {
    true
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            max_files: default_max_files(),
            parallel: default_parallel(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootConfig {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    #[serde(default)]
    pub roots: Vec<RootConfig>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,
    #[serde(default = "default_excluded_suffixes")]
    pub excluded_suffixes: Vec<String>,
    #[serde(default)]
    pub include_hidden: bool,
    #[serde(default = "default_skip_binary")]
    pub skip_binary: bool,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_streaming_threshold")]
    pub streaming_threshold: u64,
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
    #[serde(default)]
    pub edit_url: Option<String>,
}

fn default_extensions() -> Vec<String> {
    ["php", "html", "css", "js", "twig", "txt"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_excluded_dirs() -> Vec<String> {
    [".git", ".svn", "node_modules", "vendor", ".idea", "cache", "tmp", "logs"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_excluded_suffixes() -> Vec<String> {
    ["bak", "backup", "tmp", "temp", "log"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_skip_binary() -> bool {
    true
}
fn default_max_file_size() -> u64 {
    2 * 1024 * 1024
}
fn default_streaming_threshold() -> u64 {
    512 * 1024
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            extensions: default_extensions(),
            excluded_dirs: default_excluded_dirs(),
            excluded_suffixes: default_excluded_suffixes(),
            include_hidden: false,
            skip_binary: default_skip_binary(),
            max_file_size: default_max_file_size(),
            streaming_threshold: default_streaming_threshold(),
            backup_dir: None,
            edit_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsConfig {
    /// JSON document backing the record store.
    #[serde(default)]
    pub store: Option<PathBuf>,
    #[serde(default = "default_statuses")]
    pub statuses: Vec<RecordStatus>,
    #[serde(default = "default_max_field_bytes")]
    pub max_field_bytes: usize,
    #[serde(default)]
    pub include_internal_meta: bool,
    #[serde(default)]
    pub edit_url: Option<String>,
    #[serde(default)]
    pub view_url: Option<String>,
}

fn default_statuses() -> Vec<RecordStatus> {
    vec![
        RecordStatus::Publish,
        RecordStatus::Private,
        RecordStatus::Draft,
    ]
}
fn default_max_field_bytes() -> usize {
    1024 * 1024
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            store: None,
            statuses: default_statuses(),
            max_field_bytes: default_max_field_bytes(),
            include_internal_meta: false,
            edit_url: None,
            view_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Fields up to this many chars are shown whole.
    #[serde(default = "default_whole_below")]
    pub whole_below: usize,
    #[serde(default = "default_half_width")]
    pub half_width: usize,
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
    #[serde(default = "default_max_line_previews")]
    pub max_line_previews: usize,
}

fn default_whole_below() -> usize {
    400
}
fn default_half_width() -> usize {
    200
}
fn default_context_lines() -> usize {
    2
}
fn default_max_line_previews() -> usize {
    100
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            whole_below: default_whole_below(),
            half_width: default_half_width(),
            context_lines: default_context_lines(),
            max_line_previews: default_max_line_previews(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        match Self::find_config_path()? {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content).with_context(|| "Failed to parse config file")
    }

    fn find_config_path() -> Result<Option<PathBuf>> {
        if let Some(xdg_config) = dirs::config_dir() {
            let xdg_path = xdg_config.join("rfsr/config.toml");
            if xdg_path.exists() {
                return Ok(Some(xdg_path));
            }
        }

        if let Some(home) = dirs::home_dir() {
            let home_path = home.join(".rfsr.toml");
            if home_path.exists() {
                return Ok(Some(home_path));
            }
        }

        let current_path = Path::new(".rfsr.toml");
        if current_path.exists() {
            return Ok(Some(current_path.to_path_buf()));
        }

        Ok(None)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_streaming_below_hard_cap() {
        let cfg = Config::default();
        assert!(cfg.files.streaming_threshold < cfg.files.max_file_size);
        assert_eq!(cfg.limits.max_files, 500);
        assert_eq!(cfg.preview.half_width * 2, cfg.preview.whole_below);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [limits]
            max_files = 50

            [[files.roots]]
            name = "theme"
            path = "/srv/theme"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.limits.max_files, 50);
        assert_eq!(cfg.limits.max_records, 100);
        assert_eq!(cfg.files.roots[0].name, "theme");
        assert!(cfg.files.extensions.iter().any(|e| e == "php"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut cfg = Config::default();
        cfg.preview.context_lines = 4;
        cfg.save(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.preview.context_lines, 4);
    }
}
