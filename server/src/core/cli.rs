use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::constants::{
    ENV_AUTH_TOKEN, ENV_CONFIG, ENV_DATABASE, ENV_HOST, ENV_MAX_RESULTS, ENV_PORT,
};

#[derive(Parser)]
#[command(name = "epidata")]
#[command(version, about = "Epidemiological data API", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// DuckDB database file (in-memory when unset)
    #[arg(long, short = 'd', global = true, env = ENV_DATABASE)]
    pub database: Option<PathBuf>,

    /// Maximum rows returned per request
    #[arg(long, global = true, env = ENV_MAX_RESULTS)]
    pub max_results: Option<u64>,

    /// Shared API token required in the `auth` parameter
    #[arg(long, global = true, env = ENV_AUTH_TOKEN, hide_env_values = true)]
    pub auth_token: Option<String>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the server (default command)
    Start,
    /// Load and validate the configuration, then exit
    Check,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub max_results: Option<u64>,
    pub auth_token: Option<String>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        host: cli.host,
        port: cli.port,
        config: cli.config,
        database: cli.database,
        max_results: cli.max_results,
        auth_token: cli.auth_token,
    };
    (config, cli.command)
}
