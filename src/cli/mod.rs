//! CLI command definitions and handlers

use clap::{Parser, Subcommand};
pub use clap_complete::Shell;
use std::path::PathBuf;

pub mod args;
pub mod cache;
pub mod completions;
pub mod context;
pub mod widgets;

pub use args::{GlobalOptions, OutputFormat};
pub use context::CommandContext;

/// Informer - self-hosted dashboard server
#[derive(Parser, Debug)]
#[command(name = "informer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output format (table, json)
    #[arg(
        long,
        global = true,
        env = "INFORMER_FORMAT",
        default_value = "table",
        hide_env = true,
        hide_possible_values = true
    )]
    pub format: OutputFormat,

    /// Override config file location (defaults to ./informer.yml)
    #[arg(long, global = true, env = "INFORMER_CONFIG", hide_env = true)]
    pub config: Option<PathBuf>,

    /// Override cache directory
    #[arg(long, global = true, env = "INFORMER_CACHE_DIR", hide_env = true)]
    pub cache_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true, env = "INFORMER_DEBUG", hide_env = true)]
    pub debug: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the dashboard server
    Serve {
        /// Address to listen on (overrides settings.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides settings.port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Manage the on-disk response cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// List available widget types
    Widgets {
        /// Show the arguments of one widget type
        widget_type: Option<String>,
    },

    /// Display version information
    Version,

    /// Generate shell completions
    #[command(after_help = "\
Examples:
  bash:   informer completion bash > /etc/bash_completion.d/informer
  zsh:    informer completion zsh > \"${fpath[1]}/_informer\"
  fish:   informer completion fish > ~/.config/fish/completions/informer.fish")]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    pub fn is_serve(&self) -> bool {
        matches!(self, Commands::Serve { .. })
    }
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Serve { host: None, port: None }
    }
}

/// Cache management subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// List cache files with their size and age
    List {
        /// Only files of this widget type
        widget_type: Option<String>,

        /// Fail on files whose names are not valid partition names
        #[arg(long)]
        strict: bool,
    },

    /// Delete cache files
    #[command(after_help = "\
Examples:
  informer cache clean            # every cache file, after confirmation
  informer cache clean xkcd       # only xkcd partitions
  informer cache clean --yes      # no confirmation")]
    Clean {
        /// Only files of this widget type
        widget_type: Option<String>,

        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Remove files no configured widget uses, then evict expired entries
    Prune,
}
