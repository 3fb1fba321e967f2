//! Database schema definitions
//!
//! This module contains the SQL schema for persisted jobs.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per finished job
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    mode TEXT NOT NULL,
    status TEXT NOT NULL,
    target TEXT NOT NULL,
    options TEXT NOT NULL,
    cancelled INTEGER NOT NULL DEFAULT 0,
    failure TEXT,
    errors TEXT NOT NULL,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    total_time_ms INTEGER
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

-- Page results in the order the job recorded them
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL REFERENCES jobs(id),
    position INTEGER NOT NULL,
    url TEXT NOT NULL,
    status TEXT NOT NULL,
    error TEXT,
    title TEXT,
    depth INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL,
    fetched_at TEXT NOT NULL,
    content TEXT NOT NULL,
    screenshots TEXT NOT NULL,
    metadata TEXT,
    assistant_reply TEXT,
    UNIQUE(job_id, position)
);

CREATE INDEX IF NOT EXISTS idx_pages_job ON pages(job_id);
CREATE INDEX IF NOT EXISTS idx_pages_status ON pages(status);
"#;

/// Initializes the database schema
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

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["jobs", "pages"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
