use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the fequery binary.
#[derive(Debug, Parser)]
#[command(
    name = "fequery",
    version,
    about = "Read and edit the example collection through a shared query cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FEQUERY_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List every record, sorted by name.
    List,
    /// Show one record.
    Get(NameArgs),
    /// Create a record, then print the refreshed list.
    Create(CreateArgs),
    /// Replace the age of an existing record, then print the refreshed list.
    Replace(ReplaceArgs),
    /// Delete a record, then print the refreshed list.
    Delete(NameArgs),
    /// Show the signed-in user.
    Info,
}

#[derive(Debug, Args, Clone)]
pub struct NameArgs {
    /// Record name (the natural key).
    #[arg(value_name = "NAME")]
    pub name: String,
}

#[derive(Debug, Args, Clone)]
pub struct CreateArgs {
    #[arg(long, value_name = "NAME")]
    pub name: String,

    #[arg(long, value_name = "AGE")]
    pub age: u32,
}

#[derive(Debug, Args, Clone)]
pub struct ReplaceArgs {
    /// Record to replace; the name itself never changes.
    #[arg(value_name = "NAME")]
    pub name: String,

    #[arg(long, value_name = "AGE")]
    pub age: u32,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the page location the API base URL is derived from.
    #[arg(long = "location", value_name = "URL", global = true)]
    pub location: Option<String>,

    /// Toggle development mode.
    #[arg(
        long = "development",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub development: Option<bool>,

    /// Override the standalone development server URL.
    #[arg(long = "dev-override-url", value_name = "URL", global = true)]
    pub dev_override_url: Option<String>,

    /// Override the request timeout.
    #[arg(long = "timeout-seconds", value_name = "SECONDS", global = true)]
    pub timeout_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}
