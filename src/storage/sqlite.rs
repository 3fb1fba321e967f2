//! SQLite job sink
//!
//! This module provides a SQLite-based implementation of the JobSink trait,
//! plus a few read-back queries for inspecting what was persisted.

use crate::state::{Job, JobId, JobMode, JobStatus, JobSummary};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{JobSink, StorageError, StorageResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed sink for finished jobs
pub struct SqliteJobSink {
    conn: Mutex<Connection>,
}

impl SqliteJobSink {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteJobSink)` - Database opened and schema initialized
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))
    }

    /// Number of page results stored for a job
    pub fn count_pages(&self, id: JobId) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE job_id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Reads back the summary of a persisted job
    pub fn load_job_summary(&self, id: JobId) -> StorageResult<Option<JobSummary>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT mode, status, cancelled, total_time_ms,
                        (SELECT COUNT(*) FROM pages WHERE job_id = jobs.id),
                        (SELECT COUNT(*) FROM pages WHERE job_id = jobs.id AND status = 'failed')
                 FROM jobs WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((mode, status, cancelled, total_time_ms, pages, failed_pages)) = row else {
            return Ok(None);
        };

        let mode: JobMode = mode.parse().map_err(StorageError::Database)?;
        let status = JobStatus::from_db_string(&status)
            .ok_or_else(|| StorageError::Database(format!("unknown job status '{}'", status)))?;

        Ok(Some(JobSummary {
            id,
            mode,
            status,
            pages: pages as usize,
            failed_pages: failed_pages as usize,
            cancelled,
            total_time_ms: total_time_ms.map(|t| t as u64),
        }))
    }
}

impl JobSink for SqliteJobSink {
    fn persist(&self, job: &Job) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO jobs
             (id, mode, status, target, options, cancelled, failure, errors,
              created_at, started_at, completed_at, total_time_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                job.id.to_string(),
                job.mode().as_str(),
                job.status().to_db_string(),
                serde_json::to_string(&job.target)?,
                serde_json::to_string(&job.options)?,
                job.is_cancelled(),
                job.failure(),
                serde_json::to_string(job.errors())?,
                job.created_at.to_rfc3339(),
                job.started_at().map(|t| t.to_rfc3339()),
                job.completed_at().map(|t| t.to_rfc3339()),
                job.total_time_ms().map(|t| t as i64),
            ],
        )?;
        if inserted == 0 {
            return Err(StorageError::AlreadyPersisted(job.id.to_string()));
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO pages
                 (job_id, position, url, status, error, title, depth, duration_ms,
                  fetched_at, content, screenshots, metadata, assistant_reply)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;

            for (position, page) in job.results().iter().enumerate() {
                let metadata = page
                    .metadata
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                stmt.execute(params![
                    job.id.to_string(),
                    position as i64,
                    page.url.as_str(),
                    page.status.to_db_string(),
                    page.error,
                    page.title,
                    page.depth,
                    page.duration_ms as i64,
                    page.fetched_at.to_rfc3339(),
                    serde_json::to_string(&page.content)?,
                    serde_json::to_string(&page.screenshots)?,
                    metadata,
                    page.assistant_reply,
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!(
            "Persisted job {} with {} pages",
            job.id,
            job.results().len()
        );
        Ok(())
    }
}
