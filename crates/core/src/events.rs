//! Stack events and filtering by action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the remote event feed. Read-only; lives for one poll tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    pub id: String,
    pub logical_resource_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_status: Option<String>,
    pub status_reason: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl EventRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Default::default() }
    }

    /// Resource events carry their status in the id (`Bucket-CREATE_COMPLETE-2024-...`).
    pub fn belongs_to(&self, action_tag: &str) -> bool {
        !action_tag.is_empty() && self.id.contains(action_tag)
    }

    /// Human-readable one-liner for event output.
    pub fn line(&self) -> String {
        let mut out = String::new();
        if let Some(ts) = self.timestamp {
            out.push_str(&ts.format("%Y-%m-%dT%H:%M:%SZ ").to_string());
        }
        match (self.logical_resource_id.as_deref(), self.resource_status.as_deref()) {
            (Some(id), Some(status)) => {
                out.push_str(id);
                if let Some(ty) = self.resource_type.as_deref() {
                    out.push_str(" [");
                    out.push_str(ty);
                    out.push(']');
                }
                out.push(' ');
                out.push_str(status);
            }
            _ => out.push_str(&self.id),
        }
        if let Some(reason) = self.status_reason.as_deref().filter(|r| !r.is_empty()) {
            out.push_str(": ");
            out.push_str(reason);
        }
        out
    }
}

/// Keep only events associated with `action_tag`, in their original order.
pub fn filter_events(events: Vec<EventRecord>, action_tag: &str) -> Vec<EventRecord> {
    events.into_iter().filter(|e| e.belongs_to(action_tag)).collect()
}
