pub mod core;
pub mod logging;

pub use crate::core::build::Build;
pub use crate::core::config::Settings;
pub use crate::core::job::{
    FinishFields, Hooks, JobAggregate, JobError, JobEvent, JobLog, JobState, NewJob, Repository,
    SponsorTable, Sponsorable, StartFields, Taggable, TestJob, state_label,
};
pub use crate::core::notification::{
    Channel, DispatchError, Dispatcher, Envelope, EventBus, Handler, LogTransport,
    NotificationSubject, Outbox, Transport,
};
pub use crate::core::service::JobService;
pub use crate::core::store::JobStore;
