//! Global CLI options shared across all commands

use std::path::{Path, PathBuf};

use crate::cli::{Cli, OutputFormat};
use crate::config::Config;

/// Global CLI options passed to all command handlers.
///
/// # Precedence
///
/// For the cache root: `--cache-dir` flag > `INFORMER_CACHE_DIR` >
/// `settings.cache_dir` in the config file > per-user cache directory.
/// The config file part is resolved later in `CommandContext`.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Output format (table, json)
    pub format: OutputFormat,

    /// Custom config file path (defaults to ./informer.yml)
    pub config: Option<PathBuf>,

    /// Cache root override
    pub cache_dir: Option<PathBuf>,
}

impl GlobalOptions {
    /// Create GlobalOptions from a parsed CLI struct.
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            format: cli.format,
            config: cli.config.clone(),
            cache_dir: cli.cache_dir.clone(),
        }
    }

    /// Config file to load, explicit or default
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Whether the config path was given explicitly
    pub fn config_is_explicit(&self) -> bool {
        self.config.is_some()
    }

    pub fn cache_dir_ref(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }
}
