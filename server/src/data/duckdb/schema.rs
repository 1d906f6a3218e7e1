//! DuckDB schema definitions
//!
//! Only the service's own tables live here. Dataset tables are created
//! externally or through `database.init_sql`.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema SQL
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at BIGINT NOT NULL,
    description VARCHAR
);

-- One row per finished API response
CREATE TABLE IF NOT EXISTS api_analytics (
    datetime    TIMESTAMP NOT NULL,
    ip          VARCHAR,
    ua          VARCHAR,
    source      VARCHAR,
    result      INTEGER NOT NULL,
    num_rows    BIGINT NOT NULL
);
"#;
