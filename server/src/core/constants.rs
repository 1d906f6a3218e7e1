// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "Epidata";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "epidata";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".epidata";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "epidata.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "EPIDATA_CONFIG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for server host
pub const ENV_HOST: &str = "EPIDATA_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "EPIDATA_PORT";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "EPIDATA_LOG";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 5480;

// =============================================================================
// Database
// =============================================================================

/// Environment variable for the DuckDB database file (unset = in-memory)
pub const ENV_DATABASE: &str = "EPIDATA_DATABASE";

/// Environment variable for the per-request row cap
pub const ENV_MAX_RESULTS: &str = "EPIDATA_MAX_RESULTS";

/// Default per-request row cap
pub const DEFAULT_MAX_RESULTS: u64 = 10_000;

/// DuckDB checkpoint interval in seconds (5 minutes)
pub const DUCKDB_CHECKPOINT_INTERVAL_SECS: u64 = 300;

// =============================================================================
// Authentication
// =============================================================================

/// Environment variable for the shared API token
pub const ENV_AUTH_TOKEN: &str = "EPIDATA_AUTH_TOKEN";

/// Request parameter carrying the API token
pub const AUTH_PARAM: &str = "auth";

// =============================================================================
// Streaming
// =============================================================================

/// Buffered bytes before a chunk is sent to the client
pub const STREAM_CHUNK_BYTES: usize = 16 * 1024;

/// Chunks in flight between the query worker and the response body
pub const STREAM_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// Shutdown
// =============================================================================

/// Maximum time to wait for background tasks during shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;
