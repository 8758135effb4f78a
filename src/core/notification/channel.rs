use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info};

use super::{Dispatcher, Envelope, NotificationSubject, publish};

/// Notification targets. Each kind may add its own fields to the base envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Channel {
    Archive,
    ChatRoom { targets: Vec<String> },
    Email { recipients: Vec<String> },
    IssueTracker { url: String },
    Irc { channels: Vec<String> },
    Push,
    Webhook { targets: Vec<String> },
    Queue,
    /// Job lifecycle events reported by the state machine itself.
    Job,
}

impl Channel {
    pub fn handler_name(&self) -> &'static str {
        match self {
            Channel::Archive => "ArchiveHandler",
            Channel::ChatRoom { .. } => "ChatRoomHandler",
            Channel::Email { .. } => "EmailHandler",
            Channel::IssueTracker { .. } => "IssueTrackerHandler",
            Channel::Irc { .. } => "IrcHandler",
            Channel::Push => "PushHandler",
            Channel::Webhook { .. } => "WebhookHandler",
            Channel::Queue => "QueueHandler",
            Channel::Job => "JobEventHandler",
        }
    }

    fn additions(&self, subject: &dyn NotificationSubject, payload: &Value) -> Map<String, Value> {
        let mut out = Map::new();
        match self {
            Channel::ChatRoom { targets } | Channel::Webhook { targets } => {
                out.insert("targets".to_string(), targets.clone().into());
            }
            Channel::Email { recipients } => {
                out.insert("recipients".to_string(), recipients.clone().into());
            }
            Channel::IssueTracker { url } => {
                out.insert("url".to_string(), url.clone().into());
            }
            Channel::Irc { channels } => {
                out.insert("channels".to_string(), channels.clone().into());
            }
            Channel::Queue => {
                out.insert("queue".to_string(), subject.queue().into());
                out.insert("payload".to_string(), payload.clone());
            }
            Channel::Archive | Channel::Push | Channel::Job => {}
        }
        out
    }
}

/// One notify action: a channel, the logical event it was invoked for, and its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handler {
    pub channel: Channel,
    pub event: String,
    pub payload: Value,
}

impl Handler {
    pub fn new(channel: Channel, event: impl Into<String>, payload: Value) -> Self {
        Self {
            channel,
            event: event.into(),
            payload,
        }
    }

    pub fn envelope(&self, subject: &dyn NotificationSubject) -> Envelope {
        Envelope::build(
            self.channel.handler_name(),
            &self.event,
            &self.payload,
            subject,
            self.channel.additions(subject, &self.payload),
        )
    }

    pub fn completed(&self, subject: &dyn NotificationSubject, dispatcher: &dyn Dispatcher) {
        publish(dispatcher, self.envelope(subject));
    }

    pub fn failed(
        &self,
        subject: &dyn NotificationSubject,
        err: &anyhow::Error,
        dispatcher: &dyn Dispatcher,
    ) {
        let mut envelope = self.envelope(subject);
        let mut extra = Map::new();
        extra.insert("exception".to_string(), format!("{:#}", err).into());
        envelope.reverse_merge(extra);
        publish(dispatcher, envelope);
    }

    /// Delivers through `transport` and instruments the outcome either way.
    pub async fn notify(
        &self,
        subject: &(dyn NotificationSubject + Sync),
        transport: &dyn Transport,
        dispatcher: &dyn Dispatcher,
    ) -> anyhow::Result<()> {
        match transport.deliver(self).await {
            Ok(()) => {
                self.completed(subject, dispatcher);
                Ok(())
            }
            Err(e) => {
                error!(
                    handler = self.channel.handler_name(),
                    event = %self.event,
                    "notification delivery failed: {:#}",
                    e
                );
                self.failed(subject, &e, dispatcher);
                Err(e)
            }
        }
    }
}

/// Delivery mechanics for a channel (HTTP call, SMTP, queue push, ...).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, handler: &Handler) -> anyhow::Result<()>;
}

/// Records deliveries in the log instead of sending them.
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn deliver(&self, handler: &Handler) -> anyhow::Result<()> {
        info!(
            handler = handler.channel.handler_name(),
            event = %handler.event,
            "delivered notification (log transport)"
        );
        Ok(())
    }
}
