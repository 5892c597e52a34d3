//! SQLite checkpoint backend
//!
//! Records are upserted incrementally inside one transaction per save, so a
//! crash loses at most the records changed since the previous save.

use crate::checkpoint::schema::initialize_schema;
use crate::checkpoint::traits::{CheckpointError, CheckpointResult, CheckpointStore};
use crate::checkpoint::{
    CheckpointMetadata, CrawlRecord, QueuedUrl, RecordStatus, CHECKPOINT_VERSION,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const RECORD_COLUMNS: &str = "url, status, content_hash, last_attempted_at, attempt_count,
     last_error, status_code, etag, last_modified, depth, discovered_from";

/// SQLite checkpoint backend
pub struct SqliteCheckpoint {
    conn: Connection,
    path: PathBuf,
}

impl SqliteCheckpoint {
    /// Opens or creates a checkpoint database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteCheckpoint)` - Successfully opened/created database
    /// * `Err(CheckpointError)` - Failed to open database or unsupported version
    pub fn new(path: &Path) -> CheckpointResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        let store = Self {
            conn,
            path: path.to_path_buf(),
        };
        if let Some(meta) = store.metadata()? {
            if meta.version > CHECKPOINT_VERSION {
                return Err(CheckpointError::UnsupportedVersion(meta.version));
            }
        }
        Ok(store)
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> CheckpointResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }
}

fn parse_timestamp(value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlRecord> {
    let status: String = row.get(1)?;
    let attempted: String = row.get(3)?;
    Ok(CrawlRecord {
        url: row.get(0)?,
        status: RecordStatus::from_db_string(&status).unwrap_or(RecordStatus::Pending),
        content_hash: row.get(2)?,
        last_attempted_at: parse_timestamp(&attempted)?,
        attempt_count: row.get(4)?,
        last_error: row.get(5)?,
        status_code: row.get(6)?,
        etag: row.get(7)?,
        last_modified: row.get(8)?,
        depth: row.get(9)?,
        discovered_from: row.get(10)?,
    })
}

impl CheckpointStore for SqliteCheckpoint {
    // ===== Metadata =====

    fn metadata(&self) -> CheckpointResult<Option<CheckpointMetadata>> {
        let meta = self
            .conn
            .query_row(
                "SELECT version, config_name, config_fingerprint, created_at, last_updated,
                 progress_marker FROM metadata WHERE id = 1",
                [],
                |row| {
                    let created: String = row.get(3)?;
                    let updated: String = row.get(4)?;
                    Ok(CheckpointMetadata {
                        version: row.get(0)?,
                        config_name: row.get(1)?,
                        config_fingerprint: row.get(2)?,
                        created_at: parse_timestamp(&created)?,
                        last_updated: parse_timestamp(&updated)?,
                        progress_marker: row.get::<_, i64>(5)?.max(0) as u64,
                    })
                },
            )
            .optional()?;
        Ok(meta)
    }

    fn begin(&mut self, config_name: &str, fingerprint: &str) -> CheckpointResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO metadata (id, version, config_name, config_fingerprint, created_at, last_updated)
             VALUES (1, ?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET
                version = excluded.version,
                config_name = excluded.config_name,
                config_fingerprint = excluded.config_fingerprint,
                last_updated = excluded.last_updated",
            params![CHECKPOINT_VERSION, config_name, fingerprint, now],
        )?;
        Ok(())
    }

    fn reset(&mut self) -> CheckpointResult<()> {
        self.conn.execute_batch(
            "DELETE FROM records;
             DELETE FROM queue;
             DELETE FROM metadata;",
        )?;
        Ok(())
    }

    // ===== Records =====

    fn load(&self) -> CheckpointResult<HashMap<String, CrawlRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM records", RECORD_COLUMNS))?;
        let rows = stmt.query_map([], record_from_row)?;

        let mut records = HashMap::new();
        for row in rows {
            let record = row?;
            records.insert(record.url.clone(), record);
        }
        Ok(records)
    }

    fn get(&self, url: &str) -> CheckpointResult<Option<CrawlRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {} FROM records WHERE url = ?1", RECORD_COLUMNS),
                params![url],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn save(&mut self, records: &[CrawlRecord], marker: u64) -> CheckpointResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO records ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(url) DO UPDATE SET
                    status = excluded.status,
                    content_hash = excluded.content_hash,
                    last_attempted_at = excluded.last_attempted_at,
                    attempt_count = excluded.attempt_count,
                    last_error = excluded.last_error,
                    status_code = excluded.status_code,
                    etag = excluded.etag,
                    last_modified = excluded.last_modified,
                    depth = excluded.depth,
                    discovered_from = excluded.discovered_from",
                RECORD_COLUMNS
            ))?;
            for record in records {
                stmt.execute(params![
                    record.url,
                    record.status.to_db_string(),
                    record.content_hash,
                    record.last_attempted_at.to_rfc3339(),
                    record.attempt_count,
                    record.last_error,
                    record.status_code,
                    record.etag,
                    record.last_modified,
                    record.depth,
                    record.discovered_from,
                ])?;
            }
        }
        tx.execute(
            "UPDATE metadata SET last_updated = ?1, progress_marker = ?2 WHERE id = 1",
            params![Utc::now().to_rfc3339(), marker as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ===== Queue =====

    fn save_queue(&mut self, queue: &[QueuedUrl]) -> CheckpointResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM queue", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO queue (position, url, depth, discovered_from, priority)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, entry) in queue.iter().enumerate() {
                stmt.execute(params![
                    position as i64,
                    entry.url,
                    entry.depth,
                    entry.discovered_from,
                    entry.priority,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_queue(&self) -> CheckpointResult<Vec<QueuedUrl>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, depth, discovered_from, priority FROM queue ORDER BY position",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(QueuedUrl {
                url: row.get(0)?,
                depth: row.get(1)?,
                discovered_from: row.get(2)?,
                priority: row.get(3)?,
            })
        })?;

        let mut queue = Vec::new();
        for row in rows {
            queue.push(row?);
        }
        Ok(queue)
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
