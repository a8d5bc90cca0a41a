use anyhow::{bail, Context};
use colored::Colorize;
use mfe_store::{EventBus, JsonFileBackend, LocalBroadcastHub, StoreConfig, StoreEngine};
use serde_json::Value;
use tracing::debug;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let store = open_store(&cli)?;
    let result = match &cli.command {
        Command::Get(args) => cmd_get(&store, args, cli.format).await,
        Command::Set(args) => cmd_set(&store, args).await,
        Command::Delete(args) => cmd_delete(&store, args).await,
        Command::List => cmd_list(&store, cli.format).await,
        Command::Clear(args) => cmd_clear(&store, args).await,
    };
    store.destroy();
    result
}

fn load_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            StoreConfig::from_toml_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => StoreConfig::default(),
    };
    if let Some(database) = &cli.database {
        config.database_name = database.clone();
    }
    if let Some(table) = &cli.table {
        config.table_name = table.clone();
    }
    config.validate()?;
    Ok(config)
}

/// The CLI is a lone context: it gets a private hub and bus.
fn open_store(cli: &Cli) -> anyhow::Result<StoreEngine> {
    let config = load_config(cli)?;
    debug!(root = %cli.root.display(), ?config, "opening store");
    let store = StoreEngine::builder(config)
        .backend(JsonFileBackend::new(&cli.root))
        .transport(LocalBroadcastHub::new())
        .event_bus(EventBus::new())
        .build()?;
    Ok(store)
}

/// Parse `raw` as JSON, or keep it as a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

async fn cmd_get(store: &StoreEngine, args: &GetArgs, format: OutputFormat) -> anyhow::Result<()> {
    match store.get(&args.key).await? {
        Some(value) => match format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&value)?),
            OutputFormat::Text => println!("{}", serde_json::to_string_pretty(&value)?),
        },
        None => bail!("key {:?} not found", args.key),
    }
    Ok(())
}

async fn cmd_set(store: &StoreEngine, args: &SetArgs) -> anyhow::Result<()> {
    let value = parse_value(&args.value);
    store.set(&args.key, value.clone()).await?;
    println!("{} {} = {}", "✓".green().bold(), args.key.bold(), value);
    Ok(())
}

async fn cmd_delete(store: &StoreEngine, args: &DeleteArgs) -> anyhow::Result<()> {
    store.delete(&args.key).await?;
    println!("{} Deleted {}", "✓".green().bold(), args.key.bold());
    Ok(())
}

async fn cmd_list(store: &StoreEngine, format: OutputFormat) -> anyhow::Result<()> {
    let entries = store.get_all().await?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("Store {} is empty.", store.config().database_name.bold());
        return Ok(());
    }
    for (key, value) in &entries {
        println!("{}  {}", key.yellow(), value);
    }
    println!("{} entries", entries.len().to_string().bold());
    Ok(())
}

async fn cmd_clear(store: &StoreEngine, args: &ClearArgs) -> anyhow::Result<()> {
    if !args.yes {
        bail!("refusing to clear without --yes");
    }
    store.clear().await?;
    println!(
        "{} Cleared {}/{}",
        "✓".green().bold(),
        store.config().database_name.bold(),
        store.config().table_name
    );
    Ok(())
}
