//! Informer - self-hosted dashboard server with an on-disk response cache

use clap::Parser;
use std::sync::Arc;

mod cache;
mod cli;
mod config;
mod error;
mod models;
mod output;
mod server;
mod widgets;

use cli::{CacheCommands, Cli, CommandContext, Commands, GlobalOptions};
use error::Result;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

/// `--debug` forces debug output; otherwise `RUST_LOG` applies, falling
/// back to `info` for the server and `warn` for one-shot commands.
fn init_logging(debug: bool, serving: bool) {
    let default_level = if serving { "info" } else { "warn" };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let opts = GlobalOptions::from_cli(&cli);
    let command = cli.command.unwrap_or_default();

    init_logging(cli.debug, command.is_serve());
    log::debug!("Debug mode enabled");

    match command {
        Commands::Version => {
            println!("informer version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Completion { shell } => {
            cli::completions::generate(shell);
            Ok(())
        }
        Commands::Widgets { widget_type } => cli::widgets::list(opts.format, widget_type.as_deref()),
        Commands::Cache(cache_cmd) => {
            let ctx = CommandContext::new(&opts)?;
            match cache_cmd {
                CacheCommands::List { widget_type, strict } => {
                    cli::cache::list(&ctx, widget_type.as_deref(), strict)
                }
                CacheCommands::Clean { widget_type, yes } => {
                    cli::cache::clean(&ctx, widget_type.as_deref(), yes)
                }
                CacheCommands::Prune => cli::cache::prune(&ctx),
            }
        }
        Commands::Serve { host, port } => {
            let ctx = CommandContext::new(&opts)?;
            let settings = ctx.config.as_ref().map(|c| c.settings.clone()).unwrap_or_default();
            if ctx.config.is_none() {
                log::warn!(
                    "No configuration at {}; pages will fail until it exists",
                    ctx.config_path.display()
                );
            }

            let host = host.unwrap_or(settings.host);
            let port = port.unwrap_or(settings.port);
            let state = Arc::new(server::AppState {
                config_path: ctx.config_path,
                registry: widgets::WidgetRegistry::builtin(),
                cache: ctx.cache,
            });
            server::serve(state, &host, port).await
        }
    }
}
