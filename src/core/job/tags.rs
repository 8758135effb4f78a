use std::collections::BTreeSet;

use serde_json::{Map, Value};

use super::types::JobState;

/// Derives descriptive tags from a job's outcome and configuration.
pub trait Taggable {
    fn tag_state(&self) -> Option<JobState>;
    fn tag_config(&self) -> &Map<String, Value>;

    fn compute_tags(&self) -> BTreeSet<String> {
        let config = self.tag_config();
        let mut tags = BTreeSet::new();

        if let Some(state) = self.tag_state() {
            tags.insert(format!("state:{}", state));
        }
        for key in ["language", "os", "dist"] {
            if let Some(value) = config.get(key).and_then(Value::as_str) {
                tags.insert(format!("{}:{}", key, value));
            }
        }
        if config.get("allow_failure").and_then(Value::as_bool) == Some(true) {
            tags.insert("allow_failure".to_string());
        }
        if config_parse_failed(config) {
            tags.insert("invalid_config".to_string());
        }
        tags
    }
}

pub(crate) fn config_parse_failed(config: &Map<String, Value>) -> bool {
    config.get(".result").and_then(Value::as_str) == Some("parse_error")
}
