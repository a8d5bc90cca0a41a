use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "mfe",
    about = "Inspect and edit a micro-frontend state store on disk",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding the store's database files
    #[arg(long, global = true, default_value = ".mfe-store")]
    pub root: PathBuf,

    /// TOML file with database_name, table_name and channel_name
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database name; overrides the config file
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Table name; overrides the config file
    #[arg(long, global = true)]
    pub table: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the value stored under a key
    Get(GetArgs),
    /// Store a value under a key
    Set(SetArgs),
    /// Remove a key
    Delete(DeleteArgs),
    /// List every entry
    List,
    /// Remove every entry
    Clear(ClearArgs),
}

#[derive(Args)]
pub struct GetArgs {
    pub key: String,
}

#[derive(Args)]
pub struct SetArgs {
    pub key: String,
    /// JSON value; anything that is not valid JSON is stored as a string
    pub value: String,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub key: String,
}

#[derive(Args)]
pub struct ClearArgs {
    /// Required; clearing cannot be undone
    #[arg(long)]
    pub yes: bool,
}
