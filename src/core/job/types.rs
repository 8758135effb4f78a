use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Queued,
    Started,
    Passed,
    Failed,
    Errored,
    Canceled,
}

impl JobState {
    pub const FINISHED: [JobState; 4] = [
        JobState::Passed,
        JobState::Failed,
        JobState::Errored,
        JobState::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Queued => "queued",
            JobState::Started => "started",
            JobState::Passed => "passed",
            JobState::Failed => "failed",
            JobState::Errored => "errored",
            JobState::Canceled => "canceled",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "created" => Some(JobState::Created),
            "queued" => Some(JobState::Queued),
            "started" => Some(JobState::Started),
            "passed" => Some(JobState::Passed),
            "failed" => Some(JobState::Failed),
            "errored" => Some(JobState::Errored),
            "canceled" => Some(JobState::Canceled),
            _ => None,
        }
    }

    pub fn is_finished(self) -> bool {
        Self::FINISHED.contains(&self)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label used in logs and errors for a possibly-unassigned state.
pub fn state_label(state: Option<JobState>) -> &'static str {
    state.map(JobState::as_str).unwrap_or("unknown")
}

/// Lifecycle events. `Reset` is announced to subscribers as `create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEvent {
    Queue,
    Start,
    Finish,
    Reset,
}

impl JobEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            JobEvent::Queue => "queue",
            JobEvent::Start => "start",
            JobEvent::Finish => "finish",
            JobEvent::Reset => "reset",
        }
    }

    pub fn notification_name(self) -> &'static str {
        match self {
            JobEvent::Reset => "create",
            other => other.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub owner_name: String,
    pub name: String,
}

impl Repository {
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner_name, self.name)
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        let (owner_name, name) = slug.split_once('/')?;
        if owner_name.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            owner_name: owner_name.to_string(),
            name: name.to_string(),
        })
    }
}

/// Text buffer holding a job's build output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLog {
    pub id: String,
    pub content: String,
}

impl JobLog {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: String::new(),
        }
    }

    pub fn clear(&mut self) {
        self.content.clear();
    }

    pub fn append(&mut self, chunk: &str) {
        self.content.push_str(chunk);
    }
}

impl Default for JobLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Attributes a caller supplies when creating a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewJob {
    pub config: serde_json::Map<String, serde_json::Value>,
    pub owner_id: Option<String>,
    pub number: Option<String>,
    pub queue: Option<String>,
    pub request_id: Option<String>,
    pub repository: Option<Repository>,
}

/// Fields accepted by `start`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartFields {
    pub started_at: Option<DateTime<Utc>>,
    pub worker: Option<String>,
}

/// Fields accepted by `finish`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinishFields {
    pub state: Option<JobState>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("cannot {event} a job in state {from}")]
    InvalidTransition {
        from: &'static str,
        event: &'static str,
    },

    #[error("invalid finish state: {0}")]
    InvalidState(String),

    #[error("invalid value for field {key}: {reason}")]
    InvalidField { key: &'static str, reason: String },

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
