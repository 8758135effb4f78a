//! SQLite record store for jobs, their logs, and their owning builds.
//!
//! All mutation of an existing job goes through [`JobStore::transition`], which holds the
//! connection for the whole read-modify-write and commits only when the caller's closure
//! succeeds. That is the per-record serialization the state machine relies on.
//!
//! Several processes may share one database file. Write paths open `IMMEDIATE` transactions and
//! every connection waits up to [`BUSY_TIMEOUT`] for another writer to release the lock.

mod builds;
mod jobs;

use anyhow::Result;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::build::Build;
use crate::core::job::{JobError, TestJob};

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Write transaction holding the database lock from its first statement.
fn begin_write(db: &mut Connection) -> rusqlite::Result<Transaction<'_>> {
    db.transaction_with_behavior(TransactionBehavior::Immediate)
}

#[derive(Clone)]
pub struct JobStore {
    db: Arc<Mutex<Connection>>,
}

impl JobStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let db = Connection::open(path)?;
        info!("Opened job store at {}", path.display());
        Self::with_connection(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        // other processes may hold the write lock
        db.busy_timeout(BUSY_TIMEOUT)?;
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS builds (
                id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                request_id TEXT,
                repository TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                state TEXT,
                number TEXT,
                config TEXT NOT NULL DEFAULT '{}',
                queued_at TEXT,
                started_at TEXT,
                finished_at TEXT,
                worker TEXT,
                owner_id TEXT REFERENCES builds(id),
                queue TEXT,
                request_id TEXT,
                repository TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_owner ON jobs(owner_id);
            CREATE TABLE IF NOT EXISTS logs (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL UNIQUE REFERENCES jobs(id),
                content TEXT NOT NULL DEFAULT ''
            );",
        )?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Atomically loads a job (and its owning build, if any), applies `f`, and persists
    /// both. Nothing is written when `f` fails.
    pub async fn transition<T, F>(&self, job_id: &str, f: F) -> Result<(TestJob, T), JobError>
    where
        F: FnOnce(&mut TestJob, Option<&mut Build>) -> Result<T, JobError>,
    {
        let mut db = self.db.lock().await;
        let tx = begin_write(&mut db)?;

        let mut job =
            jobs::load_job(&tx, job_id)?.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        let mut build = match job.owner_id.as_deref() {
            Some(owner_id) => builds::load_build(&tx, owner_id)?,
            None => None,
        };

        let out = f(&mut job, build.as_mut())?;

        jobs::save_job(&tx, &job)?;
        if let Some(build) = &build {
            builds::save_build_state(&tx, build)?;
        }
        tx.commit()?;
        debug!(job_id, "transition committed");
        Ok((job, out))
    }
}
