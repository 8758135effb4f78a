use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension, params};

use super::JobStore;
use crate::core::build::Build;
use crate::core::job::{JobError, JobState, Repository};

pub(super) fn load_build(db: &Connection, build_id: &str) -> Result<Option<Build>, JobError> {
    let row = db
        .query_row(
            "SELECT id, state, request_id, repository FROM builds WHERE id = ?1",
            params![build_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()?;
    let Some((id, state, request_id, repository)) = row else {
        return Ok(None);
    };

    let state = JobState::from_status(&state).ok_or_else(|| JobError::Corrupt {
        id: id.clone(),
        reason: format!("build state {}", state),
    })?;

    let mut stmt = db.prepare("SELECT id, state FROM jobs WHERE owner_id = ?1")?;
    let rows = stmt.query_map(params![id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
    })?;
    let mut members = BTreeMap::new();
    for row in rows {
        let (job_id, job_state) = row?;
        members.insert(
            job_id,
            job_state.as_deref().and_then(JobState::from_status),
        );
    }

    Ok(Some(Build {
        id,
        state,
        request_id,
        repository: repository.as_deref().and_then(Repository::from_slug),
        members,
    }))
}

pub(super) fn save_build_state(db: &Connection, build: &Build) -> Result<(), JobError> {
    db.execute(
        "UPDATE builds SET state = ?1 WHERE id = ?2",
        params![build.state.as_str(), build.id],
    )?;
    Ok(())
}

impl JobStore {
    pub async fn create_build(
        &self,
        request_id: Option<String>,
        repository: Option<Repository>,
    ) -> Result<Build, JobError> {
        let build = Build::new(request_id, repository);
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO builds (id, state, request_id, repository) VALUES (?1, ?2, ?3, ?4)",
            params![
                build.id,
                build.state.as_str(),
                build.request_id,
                build.repository.as_ref().map(Repository::slug),
            ],
        )?;
        Ok(build)
    }

    pub async fn get_build(&self, build_id: &str) -> Result<Option<Build>, JobError> {
        let db = self.db.lock().await;
        load_build(&db, build_id)
    }
}
