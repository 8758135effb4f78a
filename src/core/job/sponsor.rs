use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Maps worker host suffixes to the organisation sponsoring that capacity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SponsorTable(pub BTreeMap<String, String>);

impl SponsorTable {
    /// Longest matching suffix wins.
    pub fn lookup(&self, host: &str) -> Option<&str> {
        self.0
            .iter()
            .filter(|(suffix, _)| host.ends_with(suffix.as_str()))
            .max_by_key(|(suffix, _)| suffix.len())
            .map(|(_, sponsor)| sponsor.as_str())
    }
}

pub trait Sponsorable {
    /// Identifier of the worker that ran the job, e.g. `ruby3.worker.example.org:linux-11`.
    fn worker_name(&self) -> Option<&str>;

    fn worker_host(&self) -> Option<&str> {
        self.worker_name()
            .map(|w| w.split_once(':').map(|(host, _)| host).unwrap_or(w))
    }

    fn sponsor<'a>(&self, table: &'a SponsorTable) -> Option<&'a str> {
        table.lookup(self.worker_host()?)
    }
}
