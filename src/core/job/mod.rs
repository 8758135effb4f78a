//! Test job lifecycle.
//!
//! A [`TestJob`] moves `created -> queued -> started -> {passed, failed, errored, canceled}`
//! and can be rewound to `created` with [`TestJob::reset`] once finished. Every transition
//! except `enqueue` runs the same after-hooks in a fixed order: transition-specific hooks
//! (tags on `finish`), propagation to the owning aggregate, then notification.

mod fields;
mod sponsor;
mod tags;
pub mod types;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::core::notification::{Channel, Dispatcher, Handler, NotificationSubject};

pub use sponsor::{SponsorTable, Sponsorable};
pub use tags::Taggable;
pub use types::{
    FinishFields, JobError, JobEvent, JobLog, JobState, NewJob, Repository, StartFields,
    state_label,
};

/// Parent entity informed whenever one of its member jobs changes.
pub trait JobAggregate {
    fn job_changed(&mut self, job: &TestJob, event: JobEvent);
}

/// Collaborators a transition reports to.
pub struct Hooks<'a> {
    owner: Option<&'a mut dyn JobAggregate>,
    dispatcher: &'a dyn Dispatcher,
}

impl<'a> Hooks<'a> {
    pub fn new(dispatcher: &'a dyn Dispatcher) -> Self {
        Self {
            owner: None,
            dispatcher,
        }
    }

    pub fn with_owner(mut self, owner: Option<&'a mut dyn JobAggregate>) -> Self {
        self.owner = owner;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestJob {
    pub id: String,
    pub state: Option<JobState>,
    pub number: Option<String>,
    pub config: Map<String, Value>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub worker: Option<String>,
    pub owner_id: Option<String>,
    pub queue: Option<String>,
    pub request_id: Option<String>,
    pub repository: Option<Repository>,
    pub tags: BTreeSet<String>,
    pub log: Option<JobLog>,
}

impl TestJob {
    pub fn new(new: NewJob) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: Some(JobState::Created),
            number: new.number,
            config: new.config,
            queued_at: None,
            started_at: None,
            finished_at: None,
            worker: None,
            owner_id: new.owner_id,
            queue: new.queue,
            request_id: new.request_id,
            repository: new.repository,
            tags: BTreeSet::new(),
            log: Some(JobLog::new()),
        }
    }

    pub fn enqueue(&mut self, hooks: &mut Hooks<'_>) -> Result<(), JobError> {
        self.guard(JobEvent::Queue, self.state == Some(JobState::Created))?;

        self.state = Some(JobState::Queued);
        self.queued_at = Some(Utc::now());
        self.notify(JobEvent::Queue, hooks.dispatcher);
        Ok(())
    }

    pub fn start(&mut self, fields: StartFields, hooks: &mut Hooks<'_>) -> Result<(), JobError> {
        self.guard(JobEvent::Start, self.state == Some(JobState::Queued))?;

        let started_at = fields.started_at.unwrap_or_else(Utc::now);
        ensure_not_before("started_at", started_at, self.queued_at)?;

        // a fresh run discards the output of any previous one
        self.log.get_or_insert_with(JobLog::new).clear();
        self.started_at = Some(started_at);
        if let Some(worker) = fields.worker {
            self.worker = Some(worker);
        }
        self.state = Some(JobState::Started);

        self.after_transition(JobEvent::Start, hooks);
        Ok(())
    }

    pub fn finish(&mut self, fields: FinishFields, hooks: &mut Hooks<'_>) -> Result<(), JobError> {
        self.guard(JobEvent::Finish, self.state == Some(JobState::Started))?;

        let state = fields
            .state
            .ok_or_else(|| JobError::InvalidState("missing".to_string()))?;
        if !state.is_finished() {
            return Err(JobError::InvalidState(state.to_string()));
        }
        let finished_at = fields.finished_at.unwrap_or_else(Utc::now);
        ensure_not_before("finished_at", finished_at, self.started_at)?;

        self.state = Some(state);
        self.finished_at = Some(finished_at);

        self.after_transition(JobEvent::Finish, hooks);
        Ok(())
    }

    /// Rewinds a finished job to `created`. Returns `false` without side effects when the
    /// job is already `created`.
    pub fn reset(&mut self, hooks: &mut Hooks<'_>) -> Result<bool, JobError> {
        if self.state == Some(JobState::Created) {
            debug!(job_id = %self.id, "reset skipped, job already created");
            return Ok(false);
        }
        self.guard(JobEvent::Reset, self.is_finished())?;

        self.state = Some(JobState::Created);
        self.started_at = None;
        self.queued_at = None;
        self.finished_at = None;
        self.worker = None;
        self.tags.clear();
        match self.log.as_mut() {
            Some(log) => log.clear(),
            None => self.log = Some(JobLog::new()),
        }

        self.after_transition(JobEvent::Reset, hooks);
        Ok(true)
    }

    pub fn is_cancelable(&self) -> bool {
        self.state == Some(JobState::Created)
    }

    pub fn is_resetable(&self) -> bool {
        self.is_finished() && !self.has_invalid_config()
    }

    pub fn has_invalid_config(&self) -> bool {
        tags::config_parse_failed(&self.config)
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_some_and(JobState::is_finished)
    }

    pub fn is_passed(&self) -> bool {
        self.state == Some(JobState::Passed)
    }

    pub fn is_failed(&self) -> bool {
        self.state == Some(JobState::Failed)
    }

    /// True only for a record whose state was never assigned.
    pub fn is_unknown(&self) -> bool {
        self.state.is_none()
    }

    pub fn log_id(&self) -> Option<&str> {
        self.log.as_ref().map(|l| l.id.as_str())
    }

    pub fn log_content(&self) -> Option<&str> {
        self.log.as_ref().map(|l| l.content.as_str())
    }

    /// Snapshot carried as the payload of job notifications.
    pub fn event_payload(&self) -> Value {
        json!({
            "id": self.id,
            "number": self.number,
            "state": state_label(self.state),
            "queued_at": self.queued_at,
            "started_at": self.started_at,
            "finished_at": self.finished_at,
            "worker": self.worker,
            "queue": self.queue,
            "tags": self.tags,
            "log_id": self.log_id(),
        })
    }

    fn guard(&self, event: JobEvent, allowed: bool) -> Result<(), JobError> {
        if allowed {
            return Ok(());
        }
        Err(JobError::InvalidTransition {
            from: state_label(self.state),
            event: event.as_str(),
        })
    }

    fn after_transition(&mut self, event: JobEvent, hooks: &mut Hooks<'_>) {
        if event == JobEvent::Finish {
            self.add_tags();
        }
        self.propagate(event, hooks);
        self.notify(event, hooks.dispatcher);
    }

    fn add_tags(&mut self) {
        self.tags = self.compute_tags();
    }

    fn propagate(&self, event: JobEvent, hooks: &mut Hooks<'_>) {
        if let Some(owner) = hooks.owner.as_deref_mut() {
            owner.job_changed(self, event);
        }
    }

    fn notify(&self, event: JobEvent, dispatcher: &dyn Dispatcher) {
        info!(
            job_id = %self.id,
            event = event.as_str(),
            state = state_label(self.state),
            "job transition"
        );
        Handler::new(Channel::Job, event.notification_name(), self.event_payload())
            .completed(self, dispatcher);
    }
}

fn ensure_not_before(
    key: &'static str,
    at: DateTime<Utc>,
    earlier: Option<DateTime<Utc>>,
) -> Result<(), JobError> {
    match earlier {
        Some(earlier) if at < earlier => Err(JobError::InvalidField {
            key,
            reason: format!("{} precedes the previous lifecycle timestamp {}", at, earlier),
        }),
        _ => Ok(()),
    }
}

impl Taggable for TestJob {
    fn tag_state(&self) -> Option<JobState> {
        self.state
    }

    fn tag_config(&self) -> &Map<String, Value> {
        &self.config
    }
}

impl Sponsorable for TestJob {
    fn worker_name(&self) -> Option<&str> {
        self.worker.as_deref()
    }
}

impl NotificationSubject for TestJob {
    fn object_type(&self) -> &'static str {
        "TestJob"
    }

    fn object_id(&self) -> &str {
        &self.id
    }

    fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    fn repository_slug(&self) -> Option<String> {
        self.repository.as_ref().map(Repository::slug)
    }

    fn queue(&self) -> Option<&str> {
        self.queue.as_deref()
    }
}

#[cfg(test)]
mod tests;
