//! Widget type listing

use serde_json::{Value, json};

use crate::cli::OutputFormat;
use crate::error::{Result, WidgetError};
use crate::models::{ArgumentDisplay, WidgetKindDisplay};
use crate::output::{format_json, format_table};
use crate::widgets::{WidgetKind, WidgetRegistry};

fn kind_json(kind: &WidgetKind) -> Value {
    let arguments: Vec<Value> = kind
        .arguments
        .iter()
        .map(|arg| {
            let fields: serde_json::Map<String, Value> = arg
                .fields
                .iter()
                .map(|(name, kind)| (name.to_string(), Value::from(*kind)))
                .collect();
            json!({
                "name": arg.name,
                "type": arg.kind,
                "default": arg.default,
                "fields": fields,
            })
        })
        .collect();

    json!({
        "type": kind.name,
        "cache_type": kind.cache_type,
        "description": kind.description,
        "default_cache": kind.default_cache,
        "alternate_durations": kind.alternate_durations,
        "session_timeout_secs": kind.session_timeout_secs,
        "arguments": arguments,
    })
}

/// List registered widget types, or describe one
pub fn list(format: OutputFormat, widget_type: Option<&str>) -> Result<()> {
    let registry = WidgetRegistry::builtin();

    let Some(widget_type) = widget_type else {
        match format {
            OutputFormat::Json => {
                let kinds: Vec<Value> = registry.kinds().map(kind_json).collect();
                println!("{}", format_json(&kinds)?);
            }
            OutputFormat::Table => {
                let rows: Vec<WidgetKindDisplay> = registry.kinds().map(WidgetKindDisplay::from).collect();
                println!("{}", format_table(&rows));
            }
        }
        return Ok(());
    };

    let kind = registry
        .get(widget_type)
        .ok_or_else(|| WidgetError::UnknownType(widget_type.to_string()))?;

    match format {
        OutputFormat::Json => println!("{}", format_json(&kind_json(kind))?),
        OutputFormat::Table => {
            println!("{} - {}", kind.name, kind.description);
            println!("────────────────────────────────────────");
            println!("Default cache:  {}", kind.default_cache.unwrap_or("-"));
            if kind.cache_type != kind.name {
                println!("Cached as:      {}", kind.cache_type);
            }
            if !kind.alternate_durations.is_empty() {
                println!("Also caches:    {}", kind.alternate_durations.join(", "));
            }
            println!();
            let rows: Vec<ArgumentDisplay> = kind.arguments.iter().map(ArgumentDisplay::from).collect();
            println!("{}", format_table(&rows));
        }
    }

    Ok(())
}
