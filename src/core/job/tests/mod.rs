
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value, json};

use crate::core::job::{Hooks, JobAggregate, JobEvent, JobState, NewJob, TestJob};
use crate::core::notification::{DispatchError, Dispatcher, Envelope};

#[derive(Default)]
pub(super) struct Recorder {
    pub envelopes: Mutex<Vec<Envelope>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.envelopes
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event().unwrap_or_default().to_string())
            .collect()
    }

    pub fn last(&self) -> Envelope {
        self.envelopes.lock().unwrap().last().cloned().unwrap()
    }
}

impl Dispatcher for Recorder {
    fn dispatch(&self, envelope: Envelope) -> Result<(), DispatchError> {
        self.envelopes.lock().unwrap().push(envelope);
        Ok(())
    }
}

pub(super) struct Broken;

impl Dispatcher for Broken {
    fn dispatch(&self, _envelope: Envelope) -> Result<(), DispatchError> {
        Err(DispatchError::Rejected("bus down".to_string()))
    }
}

/// Aggregate that records what it saw, to check hook ordering.
#[derive(Default)]
pub(super) struct Spy {
    pub seen: Vec<(JobEvent, Option<JobState>, Vec<String>)>,
}

impl JobAggregate for Spy {
    fn job_changed(&mut self, job: &TestJob, event: JobEvent) {
        self.seen
            .push((event, job.state, job.tags.iter().cloned().collect()));
    }
}

pub(super) fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub(super) fn payload(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

pub(super) fn job_with_config(config: Value) -> TestJob {
    TestJob::new(NewJob {
        config: payload(config),
        ..Default::default()
    })
}

/// Drives a fresh job to `state`.
pub(super) fn job_in(state: JobState) -> TestJob {
    let recorder = Recorder::default();
    let mut job = job_with_config(json!({}));
    if state == JobState::Created {
        return job;
    }
    job.enqueue(&mut Hooks::new(&recorder)).unwrap();
    if state == JobState::Queued {
        return job;
    }
    job.start(Default::default(), &mut Hooks::new(&recorder))
        .unwrap();
    if state == JobState::Started {
        return job;
    }
    job.finish(
        crate::core::job::FinishFields {
            state: Some(state),
            finished_at: None,
        },
        &mut Hooks::new(&recorder),
    )
    .unwrap();
    job
}
