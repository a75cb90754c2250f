use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// A record offered when picking a foreign-key value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: Value,
    #[serde(flatten)]
    pub display: IndexMap<String, Value>,
}

/// Searches records of a target entity; supplied by the embedder.
pub trait RecordLookup {
    type Error;

    fn resolve(&self, target: &str, search: &str) -> Result<Vec<RecordSummary>, Self::Error>;
}

/// Identifies one lookup request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupTicket(u64);

/// Last-request-wins bookkeeping for lookups that finish out of order.
#[derive(Debug, Default)]
pub struct LookupTracker {
    latest: u64,
}

impl LookupTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request, superseding every earlier one.
    pub fn begin(&mut self) -> LookupTicket {
        self.latest += 1;
        LookupTicket(self.latest)
    }

    #[must_use]
    pub fn is_current(&self, ticket: LookupTicket) -> bool {
        ticket.0 == self.latest
    }

    /// Hand back `results` only if no newer request has started.
    #[must_use]
    pub fn accept<T>(&self, ticket: LookupTicket, results: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(results)
        } else {
            tracing::trace!(ticket = ticket.0, latest = self.latest, "dropping stale lookup");
            None
        }
    }
}
