//! Classification of raw remote stack statuses into lifecycle states.
//!
//! Terminal statuses are action specific: `CREATE_COMPLETE` ends a create but
//! is only a stale leftover while an update is being applied.

use serde::{Deserialize, Serialize};

use crate::StackAction;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    InProgress,
    Succeeded,
    Failed,
    NotFound,
    Unknown,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Succeeded | LifecycleState::Failed | LifecycleState::NotFound)
    }
}

const CREATE_COMPLETE: &[&str] = &["CREATE_COMPLETE"];
// A create that rolled back (or failed to) never reaches CREATE_COMPLETE.
const CREATE_FAILED: &[&str] = &["CREATE_FAILED", "ROLLBACK_FAILED", "ROLLBACK_COMPLETE", "DELETE_FAILED"];

const UPDATE_COMPLETE: &[&str] = &["UPDATE_COMPLETE"];
const UPDATE_FAILED: &[&str] = &["UPDATE_FAILED", "UPDATE_ROLLBACK_COMPLETE", "UPDATE_ROLLBACK_FAILED"];

const DELETE_COMPLETE: &[&str] = &["DELETE_COMPLETE"];
const DELETE_FAILED: &[&str] = &["DELETE_FAILED"];

/// Every status the control plane is known to report.
const KNOWN: &[&str] = &[
    "CREATE_IN_PROGRESS",
    "CREATE_FAILED",
    "CREATE_COMPLETE",
    "ROLLBACK_IN_PROGRESS",
    "ROLLBACK_FAILED",
    "ROLLBACK_COMPLETE",
    "DELETE_IN_PROGRESS",
    "DELETE_FAILED",
    "DELETE_COMPLETE",
    "UPDATE_IN_PROGRESS",
    "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
    "UPDATE_COMPLETE",
    "UPDATE_FAILED",
    "UPDATE_ROLLBACK_IN_PROGRESS",
    "UPDATE_ROLLBACK_FAILED",
    "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS",
    "UPDATE_ROLLBACK_COMPLETE",
    "REVIEW_IN_PROGRESS",
    "IMPORT_IN_PROGRESS",
    "IMPORT_COMPLETE",
    "IMPORT_ROLLBACK_IN_PROGRESS",
    "IMPORT_ROLLBACK_FAILED",
    "IMPORT_ROLLBACK_COMPLETE",
];

/// Pure mapping from raw status to [`LifecycleState`] for one action kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusClassifier {
    action: StackAction,
}

impl StatusClassifier {
    pub fn for_action(action: StackAction) -> Self {
        Self { action }
    }

    fn terminal(&self) -> (&'static [&'static str], &'static [&'static str]) {
        match self.action {
            StackAction::Create => (CREATE_COMPLETE, CREATE_FAILED),
            StackAction::Update => (UPDATE_COMPLETE, UPDATE_FAILED),
            StackAction::Delete => (DELETE_COMPLETE, DELETE_FAILED),
            // Validate never polls; nothing is terminal for it.
            StackAction::Validate => (&[], &[]),
        }
    }

    /// Total: every input maps to exactly one state.
    pub fn classify(&self, raw_status: &str, stack_exists: bool) -> LifecycleState {
        if !stack_exists {
            return LifecycleState::NotFound;
        }
        let (complete, failed) = self.terminal();
        if complete.contains(&raw_status) {
            LifecycleState::Succeeded
        } else if failed.contains(&raw_status) {
            LifecycleState::Failed
        } else if KNOWN.contains(&raw_status) {
            LifecycleState::InProgress
        } else {
            LifecycleState::Unknown
        }
    }
}
