//! Lifecycle notifications. Sinks (logs, console, build status, test spies)
//! implement [`LifecycleNotifier`]; the client and poller only call into it.

use std::sync::Arc;

use stratus_core::{EventRecord, StackAction, StackError, StackIdentity, ValidationResult};
use tracing::{debug, error, info, warn};

use crate::Convergence;

/// One call per lifecycle transition.
pub trait LifecycleNotifier: Send + Sync {
    /// Emitted before the remote request is issued, even if it then fails.
    fn operation_started(&self, identity: &StackIdentity, action: StackAction, template_url: Option<&str>);
    fn status_update(&self, identity: &StackIdentity, raw_status: &str);
    fn event_line(&self, identity: &StackIdentity, event: &EventRecord);
    /// Emitted at most once per invocation, never for interruptions.
    fn operation_finished(&self, identity: &StackIdentity, outcome: &Convergence);
    fn validation_finished(&self, identity: &StackIdentity, result: &ValidationResult);
    fn exception(&self, identity: &StackIdentity, error: &StackError);
    fn interrupted(&self, identity: &StackIdentity);

    fn diagnostic(&self, identity: &StackIdentity, message: &str) {
        debug!(stack = %identity.name, detail = message, "diagnostic");
    }
}

/// Structured log sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl LifecycleNotifier for TracingNotifier {
    fn operation_started(&self, identity: &StackIdentity, action: StackAction, template_url: Option<&str>) {
        info!(stack = %identity.name, region = %identity.region, action = %action, template_url = ?template_url, "operation started");
    }

    fn status_update(&self, identity: &StackIdentity, raw_status: &str) {
        info!(stack = %identity.name, status = raw_status, "stack status");
    }

    fn event_line(&self, identity: &StackIdentity, event: &EventRecord) {
        info!(stack = %identity.name, event = %event.line(), "stack event");
    }

    fn operation_finished(&self, identity: &StackIdentity, outcome: &Convergence) {
        if outcome.is_success() {
            info!(stack = %identity.name, status = outcome.status(), reason = %outcome.reason(), "operation finished");
        } else {
            warn!(stack = %identity.name, status = outcome.status(), reason = %outcome.reason(), anomaly = outcome.is_anomaly(), "operation finished with problems");
        }
    }

    fn validation_finished(&self, identity: &StackIdentity, result: &ValidationResult) {
        let params: Vec<String> = result.parameters.iter().map(|p| p.to_string()).collect();
        info!(region = %identity.region, description = ?result.description, parameters = ?params, "template validated");
    }

    fn exception(&self, identity: &StackIdentity, err: &StackError) {
        error!(stack = %identity.name, error = %err, "operation aborted");
    }

    fn interrupted(&self, identity: &StackIdentity) {
        warn!(stack = %identity.name, "operation interrupted");
    }

    fn diagnostic(&self, identity: &StackIdentity, message: &str) {
        warn!(stack = %identity.name, detail = message, "diagnostic");
    }
}

/// Forwards every notification to each sink in order.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn LifecycleNotifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn LifecycleNotifier>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl LifecycleNotifier for FanoutNotifier {
    fn operation_started(&self, identity: &StackIdentity, action: StackAction, template_url: Option<&str>) {
        self.sinks.iter().for_each(|s| s.operation_started(identity, action, template_url));
    }

    fn status_update(&self, identity: &StackIdentity, raw_status: &str) {
        self.sinks.iter().for_each(|s| s.status_update(identity, raw_status));
    }

    fn event_line(&self, identity: &StackIdentity, event: &EventRecord) {
        self.sinks.iter().for_each(|s| s.event_line(identity, event));
    }

    fn operation_finished(&self, identity: &StackIdentity, outcome: &Convergence) {
        self.sinks.iter().for_each(|s| s.operation_finished(identity, outcome));
    }

    fn validation_finished(&self, identity: &StackIdentity, result: &ValidationResult) {
        self.sinks.iter().for_each(|s| s.validation_finished(identity, result));
    }

    fn exception(&self, identity: &StackIdentity, err: &StackError) {
        self.sinks.iter().for_each(|s| s.exception(identity, err));
    }

    fn interrupted(&self, identity: &StackIdentity) {
        self.sinks.iter().for_each(|s| s.interrupted(identity));
    }

    fn diagnostic(&self, identity: &StackIdentity, message: &str) {
        self.sinks.iter().for_each(|s| s.diagnostic(identity, message));
    }
}
