//! Job Store
//!
//! Durable mapping from provider job id to the job's tracking record.
//! Plain key-value semantics: put overwrites, get returns the full record,
//! delete is idempotent. Last writer wins; there are no cross-key
//! transactions.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// The engine's durable view of one in-flight remote job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Provider-assigned id; sole lookup key.
    pub job_id: String,
    /// Destination chat; immutable after creation.
    pub chat_id: i64,
    /// Caption attached to final media; immutable once set.
    pub caption: String,
    /// Message currently showing progress, if one was sent.
    pub progress_message_id: Option<i32>,
    /// Whether the progress message is media (caption edits) or text.
    pub progress_is_media: bool,
    /// Message that received terminal output; presence means at least one
    /// output was already delivered.
    pub final_media_message_id: Option<i32>,
    /// Last percentage surfaced to the user. None means none yet.
    pub last_percent: Option<u8>,
    /// When the last notification was surfaced (unix millis).
    pub last_update_at_ms: i64,
    /// Creation time (unix millis), informational.
    pub created_at_ms: i64,
}

impl JobRecord {
    /// Fresh record as created at job submission time.
    pub fn new(job_id: &str, chat_id: i64, caption: &str) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            job_id: job_id.to_string(),
            chat_id,
            caption: caption.to_string(),
            progress_message_id: None,
            progress_is_media: false,
            final_media_message_id: None,
            last_percent: None,
            // Throttle clock starts at creation so a terminal-first
            // callback does not trigger a spurious progress edit.
            last_update_at_ms: now,
            created_at_ms: now,
        }
    }
}

/// SQLite-backed job store.
pub struct JobStore {
    conn: Connection,
}

impl JobStore {
    /// Open or create the job database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;

        info!("Job store opened: {}", path.display());
        Ok(store)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                job_id TEXT PRIMARY KEY,
                chat_id INTEGER NOT NULL,
                caption TEXT NOT NULL,
                progress_message_id INTEGER,
                progress_is_media INTEGER NOT NULL DEFAULT 0,
                final_media_message_id INTEGER,
                last_percent INTEGER,
                last_update_at_ms INTEGER NOT NULL DEFAULT 0,
                created_at_ms INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    /// Persist (overwrite) the full record.
    pub fn put(&self, record: &JobRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO jobs (job_id, chat_id, caption, progress_message_id,
                 progress_is_media, final_media_message_id, last_percent,
                 last_update_at_ms, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(job_id) DO UPDATE SET
                 chat_id = excluded.chat_id,
                 caption = excluded.caption,
                 progress_message_id = excluded.progress_message_id,
                 progress_is_media = excluded.progress_is_media,
                 final_media_message_id = excluded.final_media_message_id,
                 last_percent = excluded.last_percent,
                 last_update_at_ms = excluded.last_update_at_ms,
                 created_at_ms = excluded.created_at_ms",
            params![
                record.job_id,
                record.chat_id,
                record.caption,
                record.progress_message_id,
                record.progress_is_media,
                record.final_media_message_id,
                record.last_percent,
                record.last_update_at_ms,
                record.created_at_ms,
            ],
        )?;

        debug!("Stored job {}", record.job_id);
        Ok(())
    }

    /// Look up a record by job id.
    pub fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT job_id, chat_id, caption, progress_message_id,
                     progress_is_media, final_media_message_id, last_percent,
                     last_update_at_ms, created_at_ms
                 FROM jobs WHERE job_id = ?1",
                params![job_id],
                |row| {
                    Ok(JobRecord {
                        job_id: row.get(0)?,
                        chat_id: row.get(1)?,
                        caption: row.get(2)?,
                        progress_message_id: row.get(3)?,
                        progress_is_media: row.get(4)?,
                        final_media_message_id: row.get(5)?,
                        last_percent: row.get(6)?,
                        last_update_at_ms: row.get(7)?,
                        created_at_ms: row.get(8)?,
                    })
                },
            )
            .optional()?;

        Ok(record)
    }

    /// Delete a record. Deleting a missing id is a no-op.
    pub fn delete(&self, job_id: &str) -> Result<()> {
        let n = self
            .conn
            .execute("DELETE FROM jobs WHERE job_id = ?1", params![job_id])?;
        if n > 0 {
            debug!("Retired job {}", job_id);
        }
        Ok(())
    }
}
