use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::job::{JobAggregate, JobEvent, JobState, Repository, TestJob, state_label};
use crate::core::notification::NotificationSubject;

/// Parent of a set of test jobs. Its state is derived from its members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub id: String,
    pub state: JobState,
    pub request_id: Option<String>,
    pub repository: Option<Repository>,
    pub members: BTreeMap<String, Option<JobState>>,
}

impl Build {
    pub fn new(request_id: Option<String>, repository: Option<Repository>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: JobState::Created,
            request_id,
            repository,
            members: BTreeMap::new(),
        }
    }

    pub fn add_member(&mut self, job_id: &str, state: Option<JobState>) {
        self.members.insert(job_id.to_string(), state);
        self.state = self.derive_state();
    }

    /// - all created (or no members): `created`
    /// - any member unfinished once some member has progressed: `started`
    /// - all finished: `passed` if every member passed, else `canceled`, `errored`, `failed`
    ///   in that order of precedence
    pub fn derive_state(&self) -> JobState {
        let states: Vec<Option<JobState>> = self.members.values().copied().collect();
        if states
            .iter()
            .all(|s| matches!(s, None | Some(JobState::Created)))
        {
            return JobState::Created;
        }
        if !states.iter().all(|s| s.is_some_and(JobState::is_finished)) {
            return JobState::Started;
        }
        let any = |wanted: JobState| states.contains(&Some(wanted));
        if states.iter().all(|s| *s == Some(JobState::Passed)) {
            JobState::Passed
        } else if any(JobState::Canceled) {
            JobState::Canceled
        } else if any(JobState::Errored) {
            JobState::Errored
        } else {
            JobState::Failed
        }
    }
}

impl JobAggregate for Build {
    fn job_changed(&mut self, job: &TestJob, event: JobEvent) {
        self.members.insert(job.id.clone(), job.state);
        let derived = self.derive_state();
        if derived != self.state {
            info!(
                build_id = %self.id,
                job_id = %job.id,
                event = event.as_str(),
                job_state = state_label(job.state),
                "build state {} -> {}",
                self.state,
                derived
            );
            self.state = derived;
        }
    }
}

impl NotificationSubject for Build {
    fn object_type(&self) -> &'static str {
        "Build"
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::{FinishFields, Hooks, NewJob, StartFields};
    use crate::core::notification::Outbox;

    fn build_with(states: &[Option<JobState>]) -> Build {
        let mut build = Build::new(None, None);
        for (i, state) in states.iter().enumerate() {
            build.add_member(&format!("job-{}", i), *state);
        }
        build
    }

    #[test]
    fn empty_or_all_created_is_created() {
        assert_eq!(build_with(&[]).state, JobState::Created);
        assert_eq!(
            build_with(&[Some(JobState::Created), None]).state,
            JobState::Created
        );
    }

    #[test]
    fn partially_progressed_is_started() {
        let build = build_with(&[Some(JobState::Passed), Some(JobState::Queued)]);
        assert_eq!(build.state, JobState::Started);
    }

    #[test]
    fn finished_outcome_precedence() {
        assert_eq!(
            build_with(&[Some(JobState::Passed), Some(JobState::Passed)]).state,
            JobState::Passed
        );
        assert_eq!(
            build_with(&[Some(JobState::Failed), Some(JobState::Errored)]).state,
            JobState::Errored
        );
        assert_eq!(
            build_with(&[Some(JobState::Errored), Some(JobState::Canceled)]).state,
            JobState::Canceled
        );
        assert_eq!(
            build_with(&[Some(JobState::Passed), Some(JobState::Failed)]).state,
            JobState::Failed
        );
    }

    #[test]
    fn member_transitions_propagate_to_build() {
        let mut build = Build::new(Some("req-1".into()), None);
        let mut job = TestJob::new(NewJob {
            owner_id: Some(build.id.clone()),
            ..Default::default()
        });
        build.add_member(&job.id, job.state);
        let outbox = Outbox::new();

        job.enqueue(&mut Hooks::new(&outbox).with_owner(Some(&mut build)))
            .unwrap();
        // enqueue only notifies
        assert_eq!(build.state, JobState::Created);

        job.start(
            StartFields::default(),
            &mut Hooks::new(&outbox).with_owner(Some(&mut build)),
        )
        .unwrap();
        assert_eq!(build.state, JobState::Started);

        job.finish(
            FinishFields {
                state: Some(JobState::Passed),
                finished_at: None,
            },
            &mut Hooks::new(&outbox).with_owner(Some(&mut build)),
        )
        .unwrap();
        assert_eq!(build.state, JobState::Passed);

        job.reset(&mut Hooks::new(&outbox).with_owner(Some(&mut build)))
            .unwrap();
        assert_eq!(build.state, JobState::Created);
    }

    #[test]
    fn build_is_a_notification_subject() {
        let build = Build::new(
            Some("req-9".into()),
            Repository::from_slug("acme/widgets"),
        );
        assert_eq!(build.object_type(), "Build");
        assert_eq!(build.request_id(), Some("req-9"));
        assert_eq!(build.repository_slug().as_deref(), Some("acme/widgets"));
        assert_eq!(build.queue(), None);
    }
}
