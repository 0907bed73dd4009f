//! Command execution context
//!
//! Loads the configuration and opens the cache root once so command
//! handlers only deal with their own work.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{CacheContext, resolve_cache_root};
use crate::cli::{GlobalOptions, OutputFormat};
use crate::config::Config;
use crate::error::{ConfigError, Error, Result};

/// Context for command execution containing config, cache and runtime options.
pub struct CommandContext {
    /// Loaded configuration, if the file exists
    pub config: Option<Config>,
    /// Path the configuration was (or would be) loaded from
    pub config_path: PathBuf,
    /// Shared cache state rooted at the resolved cache directory
    pub cache: Arc<CacheContext>,
    /// Output format preference
    pub format: OutputFormat,
}

impl CommandContext {
    /// Create a new command context.
    ///
    /// A missing default config file is tolerated so cache commands work
    /// without one; a missing file named with `--config` is an error.
    pub fn new(opts: &GlobalOptions) -> Result<Self> {
        let config_path = opts.config_path();
        let config = match Config::load_from(&config_path) {
            Ok(config) => Some(config),
            Err(Error::Config(ConfigError::NotFound(path))) if !opts.config_is_explicit() => {
                log::debug!("No configuration at {}", path.display());
                None
            }
            Err(e) => return Err(e),
        };

        let configured_dir = config.as_ref().and_then(|c| c.settings.cache_dir.clone());
        let root = resolve_cache_root(opts.cache_dir_ref().or(configured_dir.as_deref()))?;
        log::debug!("Using cache root {}", root.display());

        Ok(Self {
            config,
            config_path,
            cache: CacheContext::shared(root, reqwest::Client::new()),
            format: opts.format,
        })
    }

    /// The configuration, for commands that cannot run without one
    pub fn require_config(&self) -> Result<&Config> {
        self.config
            .as_ref()
            .ok_or_else(|| ConfigError::NotFound(self.config_path.clone()).into())
    }
}
