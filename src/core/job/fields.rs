//! Allow-listed payload parsing for `start` and `finish`.
//!
//! Each operation owns a fixed table of accepted keys and their setters.
//! Keys outside the table are dropped; a `null` value leaves the field unset.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use super::types::{FinishFields, JobError, JobState, StartFields};

type Setter<T> = fn(&mut T, &Value) -> Result<(), JobError>;

const START_FIELDS: &[(&str, Setter<StartFields>)] =
    &[("started_at", set_started_at), ("worker", set_worker)];

const FINISH_FIELDS: &[(&str, Setter<FinishFields>)] =
    &[("state", set_state), ("finished_at", set_finished_at)];

fn set_started_at(fields: &mut StartFields, value: &Value) -> Result<(), JobError> {
    fields.started_at = Some(parse_timestamp("started_at", value)?);
    Ok(())
}

fn set_worker(fields: &mut StartFields, value: &Value) -> Result<(), JobError> {
    fields.worker = Some(parse_string("worker", value)?);
    Ok(())
}

fn set_state(fields: &mut FinishFields, value: &Value) -> Result<(), JobError> {
    let raw = parse_string("state", value)?;
    let state = JobState::from_status(&raw).ok_or(JobError::InvalidState(raw))?;
    fields.state = Some(state);
    Ok(())
}

fn set_finished_at(fields: &mut FinishFields, value: &Value) -> Result<(), JobError> {
    fields.finished_at = Some(parse_timestamp("finished_at", value)?);
    Ok(())
}

impl StartFields {
    pub fn from_payload(payload: &Map<String, Value>) -> Result<Self, JobError> {
        apply_allowed(payload, START_FIELDS, "start")
    }
}

impl FinishFields {
    pub fn from_payload(payload: &Map<String, Value>) -> Result<Self, JobError> {
        apply_allowed(payload, FINISH_FIELDS, "finish")
    }
}

fn apply_allowed<T: Default>(
    payload: &Map<String, Value>,
    table: &[(&str, Setter<T>)],
    operation: &str,
) -> Result<T, JobError> {
    let mut out = T::default();
    for (key, value) in payload {
        match table.iter().find(|(name, _)| *name == key.as_str()) {
            Some(_) if value.is_null() => {}
            Some((_, set)) => set(&mut out, value)?,
            None => debug!(operation, key = %key, "ignoring unrecognized field"),
        }
    }
    Ok(out)
}

fn parse_string(key: &'static str, value: &Value) -> Result<String, JobError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| JobError::InvalidField {
            key,
            reason: format!("expected a string, got {}", value),
        })
}

fn parse_timestamp(key: &'static str, value: &Value) -> Result<DateTime<Utc>, JobError> {
    let raw = parse_string(key, value)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| JobError::InvalidField {
            key,
            reason: e.to_string(),
        })
}
