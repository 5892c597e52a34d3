//! SQLite checkpoint schema

/// SQL schema for the checkpoint database
pub const SCHEMA_SQL: &str = r#"
-- Single-row checkpoint header
CREATE TABLE IF NOT EXISTS metadata (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    config_name TEXT NOT NULL,
    config_fingerprint TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_updated TEXT NOT NULL,
    progress_marker INTEGER NOT NULL DEFAULT 0
);

-- One row per canonical URL
CREATE TABLE IF NOT EXISTS records (
    url TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    content_hash TEXT,
    last_attempted_at TEXT NOT NULL,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    status_code INTEGER,
    etag TEXT,
    last_modified TEXT,
    depth INTEGER NOT NULL DEFAULT 0,
    discovered_from TEXT
);

CREATE INDEX IF NOT EXISTS idx_records_status ON records(status);

-- Frontier snapshot, replaced wholesale on each save
CREATE TABLE IF NOT EXISTS queue (
    position INTEGER PRIMARY KEY,
    url TEXT NOT NULL,
    depth INTEGER NOT NULL,
    discovered_from TEXT,
    priority REAL NOT NULL DEFAULT 0
);
"#;

/// Initializes the checkpoint schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
