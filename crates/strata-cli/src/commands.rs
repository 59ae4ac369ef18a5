use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde_json::{json, Value};
use strata_store::{chain_names, ChainConfig, KeyValueStore};
use tracing::debug;

use crate::cli::*;

/// Database file used when neither `--config` nor `--db` is given.
pub const DEFAULT_DB: &str = "strata.redb";

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(cli.config.as_ref(), cli.db.as_ref())?;
    debug!(?config, "resolved chain configuration");
    let store = config.build().context("failed to open store chain")?;
    let format = cli.format;
    match cli.command {
        Command::Get(args) => cmd_get(store, args, &format).await,
        Command::Set(args) => cmd_set(store, args, &format).await,
        Command::Remove(args) => cmd_remove(store, args, &format).await,
        Command::Contains(args) => cmd_contains(store, args, &format).await,
        Command::Keys => cmd_keys(store, &format).await,
        Command::Clear => cmd_clear(store, &format).await,
        Command::Chain => cmd_chain(store, &format),
    }
}

/// Load the chain configuration; `--db` overrides the document path.
pub fn resolve_config(
    config: Option<&PathBuf>,
    db: Option<&PathBuf>,
) -> anyhow::Result<ChainConfig> {
    let mut chain = match config {
        Some(path) => ChainConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ChainConfig::persistent(DEFAULT_DB),
    };
    if let Some(db) = db {
        match chain.document.as_mut() {
            Some(document) => document.path = db.clone(),
            None => chain.document = ChainConfig::persistent(db.clone()).document,
        }
    }
    Ok(chain)
}

/// Parse a command-line value as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_json(value: &Value) {
    println!("{value}");
}

async fn cmd_get(
    store: Arc<dyn KeyValueStore>,
    args: GetArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let default = args.default.as_deref().map(parse_value).unwrap_or(Value::Null);
    let value = store.get_value(&args.key, default).await?;
    debug!(key = %args.key, found = !value.is_null(), "get");
    match format {
        OutputFormat::Json => print_json(&json!({ "key": args.key, "value": value })),
        OutputFormat::Text if value.is_null() => println!("{}", "(not set)".dimmed()),
        OutputFormat::Text => println!("{}", render(&value)),
    }
    Ok(())
}

async fn cmd_set(
    store: Arc<dyn KeyValueStore>,
    args: SetArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let value = parse_value(&args.value);
    let previous = store.set_value(&args.key, value.clone()).await?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "key": args.key,
            "value": value,
            "previous": previous,
        })),
        OutputFormat::Text => {
            println!("{} {} = {}", "✓".green().bold(), args.key.yellow(), render(&value));
            if let Some(previous) = previous {
                println!("  previous: {}", render(&previous).dimmed());
            }
        }
    }
    Ok(())
}

async fn cmd_remove(
    store: Arc<dyn KeyValueStore>,
    args: KeyArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let removed = store.remove(&args.key).await?;
    match format {
        OutputFormat::Json => print_json(&json!({ "key": args.key, "removed": removed })),
        OutputFormat::Text if removed => println!("{} Removed {}", "✓".green(), args.key.yellow()),
        OutputFormat::Text => println!(
            "{} {} was not removed from every tier",
            "!".yellow().bold(),
            args.key.yellow()
        ),
    }
    Ok(())
}

async fn cmd_contains(
    store: Arc<dyn KeyValueStore>,
    args: KeyArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let present = store.contains_key(&args.key).await?;
    match format {
        OutputFormat::Json => print_json(&json!({ "key": args.key, "present": present })),
        OutputFormat::Text if present => println!("{}", "yes".green()),
        OutputFormat::Text => println!("{}", "no".red()),
    }
    Ok(())
}

async fn cmd_keys(store: Arc<dyn KeyValueStore>, format: &OutputFormat) -> anyhow::Result<()> {
    let keys = store.get_all_keys().await?;
    match (format, keys) {
        (OutputFormat::Json, keys) => print_json(&json!({ "keys": keys })),
        (OutputFormat::Text, None) => println!("{}", "(key listing unavailable)".dimmed()),
        (OutputFormat::Text, Some(keys)) if keys.is_empty() => println!("No keys."),
        (OutputFormat::Text, Some(keys)) => {
            for key in keys {
                println!("  {key}");
            }
        }
    }
    Ok(())
}

async fn cmd_clear(store: Arc<dyn KeyValueStore>, format: &OutputFormat) -> anyhow::Result<()> {
    store.remove_all().await?;
    match format {
        OutputFormat::Json => print_json(&json!({ "cleared": true })),
        OutputFormat::Text => println!("{} Cleared all tiers.", "✓".green().bold()),
    }
    Ok(())
}

fn cmd_chain(store: Arc<dyn KeyValueStore>, format: &OutputFormat) -> anyhow::Result<()> {
    let names = chain_names(store.as_ref());
    match format {
        OutputFormat::Json => print_json(&json!({ "chain": names })),
        OutputFormat::Text => {
            let rendered: Vec<String> = names.iter().map(|n| n.cyan().to_string()).collect();
            println!("{}", rendered.join(" -> "));
        }
    }
    Ok(())
}
