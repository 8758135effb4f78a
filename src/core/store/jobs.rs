use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{JobStore, begin_write, builds};
use crate::core::job::{JobError, JobLog, JobState, NewJob, Repository, TestJob};

const JOB_COLUMNS: &str = "j.id, j.state, j.number, j.config, j.queued_at, j.started_at, \
     j.finished_at, j.worker, j.owner_id, j.queue, j.request_id, j.repository, j.tags, \
     l.id, l.content";

struct JobRow {
    id: String,
    state: Option<String>,
    number: Option<String>,
    config: String,
    queued_at: Option<String>,
    started_at: Option<String>,
    finished_at: Option<String>,
    worker: Option<String>,
    owner_id: Option<String>,
    queue: Option<String>,
    request_id: Option<String>,
    repository: Option<String>,
    tags: String,
    log_id: Option<String>,
    log_content: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            state: row.get(1)?,
            number: row.get(2)?,
            config: row.get(3)?,
            queued_at: row.get(4)?,
            started_at: row.get(5)?,
            finished_at: row.get(6)?,
            worker: row.get(7)?,
            owner_id: row.get(8)?,
            queue: row.get(9)?,
            request_id: row.get(10)?,
            repository: row.get(11)?,
            tags: row.get(12)?,
            log_id: row.get(13)?,
            log_content: row.get(14)?,
        })
    }

    fn into_job(self) -> Result<TestJob, JobError> {
        let id = self.id;
        let corrupt = |reason: String| JobError::Corrupt {
            id: id.clone(),
            reason,
        };
        let state = match self.state {
            Some(raw) => Some(
                JobState::from_status(&raw).ok_or_else(|| corrupt(format!("state {}", raw)))?,
            ),
            None => None,
        };
        let log = match (self.log_id, self.log_content) {
            (Some(id), content) => Some(JobLog {
                id,
                content: content.unwrap_or_default(),
            }),
            (None, _) => None,
        };
        Ok(TestJob {
            state,
            number: self.number,
            config: serde_json::from_str(&self.config)?,
            queued_at: parse_timestamp(self.queued_at).map_err(&corrupt)?,
            started_at: parse_timestamp(self.started_at).map_err(&corrupt)?,
            finished_at: parse_timestamp(self.finished_at).map_err(&corrupt)?,
            worker: self.worker,
            owner_id: self.owner_id,
            queue: self.queue,
            request_id: self.request_id,
            repository: self.repository.as_deref().and_then(Repository::from_slug),
            tags: serde_json::from_str(&self.tags)?,
            log,
            id,
        })
    }
}

fn parse_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>, String> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| format!("timestamp {}: {}", s, e))
    })
    .transpose()
}

fn format_timestamp(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(|t| t.to_rfc3339())
}

pub(super) fn load_job(db: &Connection, job_id: &str) -> Result<Option<TestJob>, JobError> {
    let sql = format!(
        "SELECT {} FROM jobs j LEFT JOIN logs l ON l.job_id = j.id WHERE j.id = ?1",
        JOB_COLUMNS
    );
    let row = db
        .query_row(&sql, params![job_id], JobRow::from_row)
        .optional()?;
    row.map(JobRow::into_job).transpose()
}

pub(super) fn save_job(db: &Connection, job: &TestJob) -> Result<(), JobError> {
    db.execute(
        "INSERT INTO jobs (id, state, number, config, queued_at, started_at, finished_at, worker,
                           owner_id, queue, request_id, repository, tags)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(id) DO UPDATE SET
            state = excluded.state,
            number = excluded.number,
            config = excluded.config,
            queued_at = excluded.queued_at,
            started_at = excluded.started_at,
            finished_at = excluded.finished_at,
            worker = excluded.worker,
            owner_id = excluded.owner_id,
            queue = excluded.queue,
            request_id = excluded.request_id,
            repository = excluded.repository,
            tags = excluded.tags,
            updated_at = CURRENT_TIMESTAMP",
        params![
            job.id,
            job.state.map(JobState::as_str),
            job.number,
            serde_json::to_string(&job.config)?,
            format_timestamp(job.queued_at),
            format_timestamp(job.started_at),
            format_timestamp(job.finished_at),
            job.worker,
            job.owner_id,
            job.queue,
            job.request_id,
            job.repository.as_ref().map(Repository::slug),
            serde_json::to_string(&job.tags)?,
        ],
    )?;

    if let Some(log) = &job.log {
        db.execute(
            "INSERT INTO logs (id, job_id, content) VALUES (?1, ?2, ?3)
             ON CONFLICT(job_id) DO UPDATE SET id = excluded.id, content = excluded.content",
            params![log.id, job.id, log.content],
        )?;
    }
    Ok(())
}

impl JobStore {
    pub async fn create_job(&self, new: NewJob) -> Result<TestJob, JobError> {
        let mut db = self.db.lock().await;
        let tx = begin_write(&mut db)?;
        if let Some(owner_id) = new.owner_id.as_deref()
            && builds::load_build(&tx, owner_id)?.is_none()
        {
            return Err(JobError::NotFound(owner_id.to_string()));
        }
        let job = TestJob::new(new);
        save_job(&tx, &job)?;
        if let Some(owner_id) = job.owner_id.as_deref()
            && let Some(mut build) = builds::load_build(&tx, owner_id)?
        {
            build.add_member(&job.id, job.state);
            builds::save_build_state(&tx, &build)?;
        }
        tx.commit()?;
        Ok(job)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<TestJob>, JobError> {
        let db = self.db.lock().await;
        load_job(&db, job_id)
    }

    pub async fn list_jobs(&self) -> Result<Vec<TestJob>, JobError> {
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT {} FROM jobs j LEFT JOIN logs l ON l.job_id = j.id ORDER BY j.created_at, j.id",
            JOB_COLUMNS
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map([], JobRow::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_job()?);
        }
        Ok(out)
    }

    /// Appends worker output to the job's log.
    pub async fn append_log(&self, job_id: &str, chunk: &str) -> Result<(), JobError> {
        let mut db = self.db.lock().await;
        let tx = begin_write(&mut db)?;
        let mut job =
            load_job(&tx, job_id)?.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        job.log.get_or_insert_with(JobLog::new).append(chunk);
        save_job(&tx, &job)?;
        tx.commit()?;
        Ok(())
    }
}
