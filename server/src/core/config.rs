use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::filters::ValueKind;
use crate::domain::executor::FieldKinds;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_HOST, DEFAULT_MAX_RESULTS, DEFAULT_PORT,
};

// =============================================================================
// Dataset Declarations
// =============================================================================

/// How a filter parameter is parsed and compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Integers and integer ranges against an integer column
    Integer,
    /// Strings and lexical ranges
    OrderedString,
    /// Plain strings, no ranges
    String,
    /// Dates against an integer `YYYYMMDD` column
    Date,
    /// Dates against a DATE column
    IsoDate,
    /// Strings where region codes expand to member states
    Region,
}

impl FilterKind {
    /// Value kind used when parsing the raw parameter
    pub fn value_kind(self) -> ValueKind {
        match self {
            Self::Integer => ValueKind::Integer,
            Self::OrderedString => ValueKind::OrderedString,
            Self::String | Self::Region => ValueKind::String,
            Self::Date | Self::IsoDate => ValueKind::Date,
        }
    }
}

/// One request parameter that filters a column
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FilterConfig {
    pub param: String,
    /// Column to filter; defaults to the parameter name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub kind: FilterKind,
    #[serde(default)]
    pub required: bool,
}

impl FilterConfig {
    pub fn column(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.param)
    }
}

/// Columns a dataset's `/trend` endpoint works on
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TrendConfig {
    /// Integer time column (`YYYYMMDD` or epiweek)
    pub time: String,
    /// Numeric value column
    pub value: String,
    /// Columns identifying one series
    #[serde(default)]
    pub keys: Vec<String>,
}

/// A queryable data source
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatasetConfig {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    /// At least one of these parameters must be present
    #[serde(default)]
    pub require_any: Vec<String>,
    pub fields: FieldKinds,
    #[serde(default)]
    pub order_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<TrendConfig>,
}

impl DatasetConfig {
    fn validate(&self, name: &str) -> Result<()> {
        if self.fields.is_empty() {
            anyhow::bail!("Configuration error: datasets.{}.fields is empty", name);
        }
        check_identifier(name, "table", &self.table)?;

        let mut params = Vec::new();
        for filter in &self.filters {
            if filter.param.is_empty() {
                anyhow::bail!("Configuration error: datasets.{} has a filter without a param", name);
            }
            if params.contains(&filter.param.as_str()) {
                anyhow::bail!(
                    "Configuration error: datasets.{} declares filter '{}' twice",
                    name,
                    filter.param
                );
            }
            params.push(filter.param.as_str());
            check_identifier(name, "filters.column", filter.column())?;
        }
        for column in self.fields.columns() {
            check_identifier(name, "fields", column)?;
        }
        for column in &self.order_by {
            check_identifier(name, "order_by", column)?;
        }

        if let Some(trend) = &self.trend {
            let declared: Vec<&str> = self.fields.columns().collect();
            for column in [&trend.time, &trend.value].into_iter().chain(&trend.keys) {
                if !declared.contains(&column.as_str()) {
                    anyhow::bail!(
                        "Configuration error: datasets.{}.trend column '{}' is not a declared field",
                        name,
                        column
                    );
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// File Config Structs (JSON deserialization)
// =============================================================================

/// Server configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Database configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseFileConfig {
    pub path: Option<String>,
    pub max_results: Option<u64>,
    pub init_sql: Option<Vec<String>>,
}

/// Authentication configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AuthFileConfig {
    pub token: Option<String>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub database: Option<DatabaseFileConfig>,
    pub auth: Option<AuthFileConfig>,
    pub datasets: Option<BTreeMap<String, DatasetConfig>>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(server) = other.server {
            let current = self.server.get_or_insert_with(ServerFileConfig::default);
            if server.host.is_some() {
                tracing::trace!(host = ?server.host, "Merging server.host");
                current.host = server.host;
            }
            if server.port.is_some() {
                tracing::trace!(port = ?server.port, "Merging server.port");
                current.port = server.port;
            }
        }

        if let Some(database) = other.database {
            let current = self.database.get_or_insert_with(DatabaseFileConfig::default);
            if database.path.is_some() {
                tracing::trace!(path = ?database.path, "Merging database.path");
                current.path = database.path;
            }
            if database.max_results.is_some() {
                tracing::trace!(max_results = ?database.max_results, "Merging database.max_results");
                current.max_results = database.max_results;
            }
            if database.init_sql.is_some() {
                tracing::trace!("Merging database.init_sql");
                current.init_sql = database.init_sql;
            }
        }

        if let Some(auth) = other.auth {
            let current = self.auth.get_or_insert_with(AuthFileConfig::default);
            if auth.token.is_some() {
                tracing::trace!("Merging auth.token");
                current.token = auth.token;
            }
        }

        // Datasets merge per source; a later file replaces a whole declaration
        if let Some(datasets) = other.datasets {
            let current = self.datasets.get_or_insert_with(BTreeMap::new);
            for (name, dataset) in datasets {
                tracing::trace!(source = %name, "Merging dataset");
                current.insert(name, dataset);
            }
        }
    }
}

// =============================================================================
// Runtime Config Structs (final merged configuration)
// =============================================================================

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// DuckDB file; in-memory when None
    pub path: Option<PathBuf>,
    /// Row cap applied to every query
    pub max_results: u64,
    /// Statements run once at startup
    pub init_sql: Vec<String>,
}

/// Authentication configuration
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Shared token; authentication is off when None
    pub token: Option<String>,
}

impl AuthConfig {
    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub datasets: BTreeMap<String, DatasetConfig>,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.epidata/epidata.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        // 1. Load from profile dir (~/.epidata/epidata.json) - skip if not exists
        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        // 2. Load from CLI-specified path OR local directory
        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_home(path);
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let config = Self::from_layers(file_config, cli);
        config.validate()?;
        tracing::debug!(
            host = %config.server.host,
            port = config.server.port,
            datasets = config.datasets.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Layer configs: defaults -> file config -> CLI/env overrides
    fn from_layers(file_config: FileConfig, cli: &CliConfig) -> Self {
        let file_server = file_config.server.unwrap_or_default();
        let file_database = file_config.database.unwrap_or_default();
        let file_auth = file_config.auth.unwrap_or_default();

        let host = cli
            .host
            .clone()
            .or(file_server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = cli.port.or(file_server.port).unwrap_or(DEFAULT_PORT);

        let path = cli
            .database
            .as_deref()
            .map(expand_home)
            .or_else(|| file_database.path.as_deref().map(|p| expand_home(Path::new(p))));
        let max_results = cli
            .max_results
            .or(file_database.max_results)
            .unwrap_or(DEFAULT_MAX_RESULTS);

        // an empty token disables authentication instead of requiring ""
        let token = cli
            .auth_token
            .clone()
            .or(file_auth.token)
            .filter(|t| !t.is_empty());

        Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                path,
                max_results,
                init_sql: file_database.init_sql.unwrap_or_default(),
            },
            auth: AuthConfig { token },
            datasets: file_config.datasets.unwrap_or_default(),
        }
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: server.host must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("Configuration error: server.port must be greater than 0");
        }
        if self.database.max_results == 0 {
            anyhow::bail!("Configuration error: database.max_results must be greater than 0");
        }
        for (name, dataset) in &self.datasets {
            if name.is_empty() || name.contains('/') {
                anyhow::bail!("Configuration error: invalid dataset name '{}'", name);
            }
            dataset.validate(name)?;
        }
        Ok(())
    }
}

/// Get the profile config path (~/.epidata/epidata.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Check if host binds to all network interfaces
pub(crate) fn is_all_interfaces(host: &str) -> bool {
    matches!(host, "0.0.0.0" | "::" | "[::]")
}

/// Table and column names are interpolated into statements, so they must be
/// plain (optionally schema-qualified) SQL identifiers.
fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

fn check_identifier(dataset: &str, setting: &str, value: &str) -> Result<()> {
    if !is_identifier(value) {
        anyhow::bail!(
            "Configuration error: datasets.{}.{} '{}' is not a valid identifier",
            dataset,
            setting,
            value
        );
    }
    Ok(())
}
