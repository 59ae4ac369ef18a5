use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "strata",
    about = "Strata: layered key-value stores with fallback",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Chain configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file for the document tier
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Read a value
    Get(GetArgs),
    /// Write a value
    Set(SetArgs),
    /// Delete a key from every tier
    Remove(KeyArgs),
    /// Check whether a key exists in any tier
    Contains(KeyArgs),
    /// List all keys
    Keys,
    /// Delete every entry in every tier
    Clear,
    /// Show the tiers of the configured chain
    Chain,
}

#[derive(Args)]
pub struct GetArgs {
    pub key: String,
    /// Returned when the key is absent (JSON or plain text)
    #[arg(short, long)]
    pub default: Option<String>,
}

#[derive(Args)]
pub struct SetArgs {
    pub key: String,
    /// JSON value, or plain text stored as a string
    pub value: String,
}

#[derive(Args)]
pub struct KeyArgs {
    pub key: String,
}
