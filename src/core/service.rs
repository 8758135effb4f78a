use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::core::build::Build;
use crate::core::job::{
    FinishFields, Hooks, JobAggregate, JobError, NewJob, Repository, StartFields, TestJob,
};
use crate::core::notification::{Dispatcher, Outbox};
use crate::core::store::JobStore;

/// Entry point for worker callbacks and user actions on jobs.
///
/// Each operation runs inside a store transaction; envelopes produced by the transition are
/// held in an [`Outbox`] and reach the dispatcher only after the transaction commits.
#[derive(Clone)]
pub struct JobService {
    store: JobStore,
    dispatcher: Arc<dyn Dispatcher>,
}

impl JobService {
    pub fn new(store: JobStore, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { store, dispatcher }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub async fn create_build(
        &self,
        request_id: Option<String>,
        repository: Option<Repository>,
    ) -> Result<Build, JobError> {
        self.store.create_build(request_id, repository).await
    }

    pub async fn create_job(&self, new: NewJob) -> Result<TestJob, JobError> {
        self.store.create_job(new).await
    }

    pub async fn enqueue(&self, job_id: &str) -> Result<TestJob, JobError> {
        let (job, ()) = self
            .transition(job_id, |job, hooks| job.enqueue(hooks))
            .await?;
        Ok(job)
    }

    pub async fn start(&self, job_id: &str, payload: &Map<String, Value>) -> Result<TestJob, JobError> {
        let fields = StartFields::from_payload(payload)?;
        let (job, ()) = self
            .transition(job_id, move |job, hooks| job.start(fields, hooks))
            .await?;
        Ok(job)
    }

    pub async fn finish(
        &self,
        job_id: &str,
        payload: &Map<String, Value>,
    ) -> Result<TestJob, JobError> {
        let fields = FinishFields::from_payload(payload)?;
        let (job, ()) = self
            .transition(job_id, move |job, hooks| job.finish(fields, hooks))
            .await?;
        Ok(job)
    }

    /// Returns the job and whether a reset actually happened.
    pub async fn reset(&self, job_id: &str) -> Result<(TestJob, bool), JobError> {
        self.transition(job_id, |job, hooks| job.reset(hooks)).await
    }

    async fn transition<T, F>(&self, job_id: &str, op: F) -> Result<(TestJob, T), JobError>
    where
        F: FnOnce(&mut TestJob, &mut Hooks<'_>) -> Result<T, JobError>,
    {
        let outbox = Outbox::new();
        let result = self
            .store
            .transition(job_id, |job, build| {
                let owner = build.map(|b| b as &mut dyn JobAggregate);
                let mut hooks = Hooks::new(&outbox).with_owner(owner);
                op(job, &mut hooks)
            })
            .await?;
        let flushed = outbox.flush(self.dispatcher.as_ref());
        debug!(job_id, flushed, "notifications flushed");
        Ok(result)
    }
}
