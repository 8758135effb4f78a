//! Notification instrumentation.
//!
//! Every channel handler that finishes (or fails) a notify action reports it through
//! [`Handler::completed`] / [`Handler::failed`], which build one [`Envelope`] of a
//! uniform shape and hand it to a [`Dispatcher`].

mod channel;
mod dispatcher;
mod envelope;

pub use channel::{Channel, Handler, LogTransport, Transport};
pub use dispatcher::{DispatchError, Dispatcher, EventBus, Outbox, publish};
pub use envelope::{Envelope, NotificationSubject};

#[cfg(test)]
mod tests;
