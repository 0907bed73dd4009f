//! Cache management commands

use std::io::IsTerminal;
use std::time::Duration;

use colored::Colorize;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::cache::maintenance::{FileFailure, PruneReport, RemovalReport};
use crate::cache::{CacheFootprint, CacheMaintenance};
use crate::cli::{CommandContext, OutputFormat};
use crate::error::Result;
use crate::models::{CacheFileDisplay, PrunedDisplay, RemovedDisplay};
use crate::output::{format_json, format_size, format_table};
use crate::widgets::WidgetRegistry;

/// Both phases of `cache prune`
#[derive(Debug, Serialize)]
struct PruneSummary {
    removed: RemovalReport,
    pruned: PruneReport,
}

fn print_warnings(malformed: &[String], failed: &[FileFailure]) {
    for message in malformed {
        eprintln!("{} {}", "!".yellow(), message);
    }
    for failure in failed {
        eprintln!(
            "{} {} ({}): {}",
            "✗".red(),
            failure.path.display(),
            format_size(failure.size_bytes),
            failure.error
        );
    }
}

fn print_removal(report: &RemovalReport, empty_message: &str) {
    print_warnings(&report.malformed, &report.failed);

    if report.count() == 0 {
        println!("{}", empty_message);
        return;
    }

    let rows: Vec<RemovedDisplay> = report.removed.iter().map(RemovedDisplay::from).collect();
    println!("{}", format_table(&rows));
    println!(
        "{} Removed {} file(s), freed {}",
        "✓".green(),
        report.count(),
        format_size(report.total_bytes)
    );
}

/// List cache files
pub fn list(ctx: &CommandContext, widget_type: Option<&str>, strict: bool) -> Result<()> {
    let maintenance = ctx.cache.maintenance();
    let report = if strict {
        maintenance.list_strict(widget_type)?
    } else {
        maintenance.list(widget_type)?
    };

    match ctx.format {
        OutputFormat::Json => println!("{}", format_json(&report)?),
        OutputFormat::Table => {
            print_warnings(&report.malformed, &[]);

            if report.count() == 0 {
                println!("No cache files found in {}", ctx.cache.root().display());
                return Ok(());
            }

            let rows: Vec<CacheFileDisplay> = report.files.iter().map(CacheFileDisplay::from).collect();
            println!("{}", format_table(&rows));
            println!(
                "{} file(s), {} total in {}",
                report.count(),
                format_size(report.total_bytes).bold(),
                ctx.cache.root().display()
            );
        }
    }

    Ok(())
}

/// Delete cache files, all of them or those of one widget type
pub fn clean(ctx: &CommandContext, widget_type: Option<&str>, yes: bool) -> Result<()> {
    let maintenance = ctx.cache.maintenance();

    if widget_type.is_none() && !yes && std::io::stdin().is_terminal() {
        let listed = maintenance.list(None)?;
        if listed.count() == 0 {
            println!("No cache files to remove.");
            return Ok(());
        }

        eprintln!(
            "About to delete {} cache file(s) ({}) from {}",
            listed.count(),
            format_size(listed.total_bytes),
            ctx.cache.root().display()
        );
        let confirm = Confirm::new()
            .with_prompt("Confirm deletion?")
            .default(false)
            .interact()?;

        if !confirm {
            eprintln!("Cancelled.");
            return Ok(());
        }
    }

    let report = maintenance.clean(widget_type)?;

    match ctx.format {
        OutputFormat::Json => println!("{}", format_json(&report)?),
        OutputFormat::Table => print_removal(&report, "No cache files to remove."),
    }

    Ok(())
}

fn run_prune(
    maintenance: &CacheMaintenance<'_>,
    footprints: &[CacheFootprint],
    registry: &WidgetRegistry,
    spinner: &ProgressBar,
) -> Result<PruneSummary> {
    spinner.set_message("Removing unused cache files...");
    let removed = maintenance.remove_invalid(footprints)?;
    spinner.set_message("Evicting expired entries...");
    let pruned = maintenance.prune(&registry.cache_types())?;
    Ok(PruneSummary { removed, pruned })
}

/// Remove partitions no configured widget uses, then evict expired
/// entries from the rest.
pub fn prune(ctx: &CommandContext) -> Result<()> {
    let config = ctx.require_config()?;
    let registry = WidgetRegistry::builtin();
    let footprints = registry.footprints(config.all_widgets());
    let maintenance = ctx.cache.maintenance();

    let spinner = match ctx.format {
        OutputFormat::Table => {
            let spinner = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
                spinner.set_style(style);
            }
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        }
        OutputFormat::Json => ProgressBar::hidden(),
    };

    let summary = run_prune(&maintenance, &footprints, &registry, &spinner);
    spinner.finish_and_clear();
    let summary = summary?;

    match ctx.format {
        OutputFormat::Json => println!("{}", format_json(&summary)?),
        OutputFormat::Table => {
            print_removal(&summary.removed, "No unused cache files.");
            println!();

            let pruned = &summary.pruned;
            print_warnings(&[], &pruned.failed);
            if pruned.count() == 0 {
                println!("No cache files shrank.");
            } else {
                let rows: Vec<PrunedDisplay> = pruned.pruned.iter().map(PrunedDisplay::from).collect();
                println!("{}", format_table(&rows));
                println!(
                    "{} Pruned {} file(s), reclaimed {}",
                    "✓".green(),
                    pruned.count(),
                    format_size(pruned.total_bytes)
                );
            }
        }
    }

    Ok(())
}
