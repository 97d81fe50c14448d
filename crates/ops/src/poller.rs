//! Convergence polling: describe, classify, forward events, sleep, repeat.
//!
//! The loop only ends on a terminal classification, on cancellation, or when
//! a status probe fails. It has no deadline of its own; callers that want one
//! wrap [`ConvergencePoller::wait`] (see `Orchestrator`).

use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use stratus_core::{filter_events, LifecycleState, StackAction, StackIdentity, StackResult, StatusClassifier};
use tracing::{debug, info, warn};

use crate::{CancelHandle, StackOperationClient};

/// Status reported when a deleted stack is gone.
pub const DELETED_STATUS: &str = "done";
/// Status reported when a stack disappears while it should exist.
pub const NO_SUCH_STACK: &str = "NO_SUCH_STACK";

/// How a wait for convergence ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Convergence {
    Succeeded { status: String },
    /// Terminal failed or rollback status.
    Failed { status: String },
    /// Delete finished: the stack no longer exists.
    Deleted,
    /// Create/update target disappeared before a terminal status was seen.
    Vanished { last_status: Option<String> },
    /// The caller's wait bound elapsed first.
    TimedOut { after_secs: u64 },
    Interrupted,
}

impl Convergence {
    pub fn is_success(&self) -> bool {
        matches!(self, Convergence::Succeeded { .. } | Convergence::Deleted)
    }

    /// Finished, but not in a way anyone asked for.
    pub fn is_anomaly(&self) -> bool {
        matches!(self, Convergence::Vanished { .. })
    }

    pub fn status(&self) -> &str {
        match self {
            Convergence::Succeeded { status } | Convergence::Failed { status } => status,
            Convergence::Deleted => DELETED_STATUS,
            Convergence::Vanished { .. } => NO_SUCH_STACK,
            Convergence::TimedOut { .. } => "TIMED_OUT",
            Convergence::Interrupted => "INTERRUPTED",
        }
    }

    pub fn reason(&self) -> String {
        match self {
            Convergence::Succeeded { .. } => "Success".to_string(),
            Convergence::Failed { status } => format!("Failure: stack reached {}", status),
            Convergence::Deleted => "Delete Complete".to_string(),
            Convergence::Vanished { last_status: Some(s) } => format!("Stack has been deleted (last status {})", s),
            Convergence::Vanished { last_status: None } => "Stack has been deleted".to_string(),
            Convergence::TimedOut { after_secs } => format!("no terminal status after {}s", after_secs),
            Convergence::Interrupted => "Interrupted".to_string(),
        }
    }
}

/// Waits for one stack to reach a terminal state for one action.
pub struct ConvergencePoller {
    client: StackOperationClient,
    interval: Duration,
    cancel: CancelHandle,
}

impl ConvergencePoller {
    pub fn new(client: StackOperationClient, interval: Duration, cancel: CancelHandle) -> Self {
        Self { client, interval, cancel }
    }

    /// Newest event id currently in the feed, taken before a request is issued so
    /// that events left by earlier operations are never forwarded. `None` when the
    /// feed is empty or unavailable.
    pub async fn baseline(&self, identity: &StackIdentity) -> Option<String> {
        match self.cancel.or_cancel(self.client.fetch_events(identity, None)).await? {
            Ok(events) => events.first().map(|e| e.id.clone()),
            Err(e) => {
                debug!(stack = %identity.name, error = %e, "no event baseline");
                None
            }
        }
    }

    /// Poll until terminal or cancelled. Notifies exactly one of finished or interrupted,
    /// unless a status probe fails, in which case the error is returned unreported.
    ///
    /// `since` is the newest event id that predates this operation; see [`baseline`](Self::baseline).
    pub async fn wait(&self, identity: &StackIdentity, action: StackAction, since: Option<String>) -> StackResult<Convergence> {
        let notifier = self.client.notifier();
        let classifier = StatusClassifier::for_action(action);
        let mut watermark = since;
        let mut last_status: Option<String> = None;
        let mut tick: u64 = 0;

        let outcome = loop {
            if self.cancel.is_cancelled() {
                break Convergence::Interrupted;
            }
            let Some(snapshot) = self.cancel.or_cancel(self.client.describe(identity)).await else {
                break Convergence::Interrupted;
            };
            let snapshot = snapshot?;
            tick += 1;
            counter!("stack_polls_total", 1u64);

            let state = classifier.classify(&snapshot.raw_status, snapshot.exists);
            debug!(tick, status = %snapshot.raw_status, state = ?state, terminal = state.is_terminal(), "poll");

            if snapshot.exists {
                notifier.status_update(identity, &snapshot.raw_status);
                if self.cancel.or_cancel(self.forward_events(identity, action, &mut watermark)).await.is_none() {
                    break Convergence::Interrupted;
                }
            }

            match state {
                LifecycleState::Succeeded => break Convergence::Succeeded { status: snapshot.raw_status },
                LifecycleState::Failed => break Convergence::Failed { status: snapshot.raw_status },
                LifecycleState::NotFound if action == StackAction::Delete => break Convergence::Deleted,
                LifecycleState::NotFound => break Convergence::Vanished { last_status },
                LifecycleState::Unknown => {
                    notifier.diagnostic(identity, &format!("unrecognized stack status {:?}; still waiting", snapshot.raw_status));
                }
                LifecycleState::InProgress => {}
            }
            last_status = Some(snapshot.raw_status);

            if self.cancel.or_cancel(tokio::time::sleep(self.interval)).await.is_none() {
                break Convergence::Interrupted;
            }
        };

        match &outcome {
            Convergence::Interrupted => {
                info!(stack = %identity.name, tick, "poll interrupted");
                notifier.interrupted(identity);
            }
            done => {
                info!(stack = %identity.name, tick, status = done.status(), "poll finished");
                notifier.operation_finished(identity, done);
            }
        }
        Ok(outcome)
    }

    /// Forward events for `action` newer than `watermark`.
    ///
    /// The feed is newest first; `watermark` is the newest id already seen, whether
    /// forwarded or filtered out. An unavailable feed is reported as a diagnostic
    /// and does not end the wait.
    async fn forward_events(&self, identity: &StackIdentity, action: StackAction, watermark: &mut Option<String>) {
        let notifier = self.client.notifier();
        let events = match self.client.fetch_events(identity, watermark.as_deref()).await {
            Ok(events) => events,
            Err(e) => {
                warn!(stack = %identity.name, error = %e, "event feed unavailable");
                notifier.diagnostic(identity, &format!("event feed unavailable: {}", e));
                return;
            }
        };
        let fresh: Vec<_> = events.into_iter().take_while(|e| Some(e.id.as_str()) != watermark.as_deref()).collect();
        let Some(newest) = fresh.first().map(|e| e.id.clone()) else {
            return;
        };
        let mut forwarded = 0u64;
        for event in filter_events(fresh, action.tag()) {
            notifier.event_line(identity, &event);
            forwarded += 1;
        }
        if forwarded > 0 {
            counter!("stack_events_forwarded_total", forwarded);
        }
        *watermark = Some(newest);
    }
}
