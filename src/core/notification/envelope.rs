use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An entity notifications can be about.
///
/// `request_id`, `repository_slug` and `queue` are optional capabilities; subjects
/// that lack them keep the defaults and the matching envelope keys are omitted.
pub trait NotificationSubject {
    fn object_type(&self) -> &'static str;
    fn object_id(&self) -> &str;

    fn request_id(&self) -> Option<&str> {
        None
    }

    fn repository_slug(&self) -> Option<String> {
        None
    }

    fn queue(&self) -> Option<&str> {
        None
    }
}

/// Structured record describing one dispatched notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope(Map<String, Value>);

impl Envelope {
    pub fn build(
        handler_name: &str,
        event: &str,
        payload: &Value,
        subject: &dyn NotificationSubject,
        additions: Map<String, Value>,
    ) -> Self {
        let mut fields = Map::new();
        fields.insert(
            "msg".to_string(),
            Value::String(format!(
                "{}#notify({}) for #<{} id={}>",
                handler_name,
                event,
                subject.object_type(),
                subject.object_id()
            )),
        );
        fields.insert("object_type".to_string(), subject.object_type().into());
        fields.insert("object_id".to_string(), subject.object_id().into());
        fields.insert("event".to_string(), event.into());
        fields.insert("payload".to_string(), payload.clone());

        let mut envelope = Self(fields);
        envelope.reverse_merge(additions);

        if let Some(request_id) = subject.request_id() {
            envelope.0.insert("request_id".to_string(), request_id.into());
        }
        if let Some(slug) = subject.repository_slug() {
            envelope.0.insert("repository".to_string(), slug.into());
        }
        envelope
    }

    /// Adds keys that are not already present; existing values win.
    pub fn reverse_merge(&mut self, additions: Map<String, Value>) {
        for (key, value) in additions {
            self.0.entry(key).or_insert(value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn event(&self) -> Option<&str> {
        self.get("event").and_then(Value::as_str)
    }

    pub fn msg(&self) -> Option<&str> {
        self.get("msg").and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}
