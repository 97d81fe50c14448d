use serde_json::json;
use stratus_core::{EventRecord, StackAction, StackError, StackIdentity, ValidationResult};
use stratus_ops::{Convergence, LifecycleNotifier};

use crate::Output;

/// Console sink: human lines on stdout, or one JSON object per notification.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleNotifier {
    output: Output,
}

impl ConsoleNotifier {
    pub fn new(output: Output) -> Self {
        Self { output }
    }

    fn emit(&self, human: impl FnOnce() -> String, record: impl FnOnce() -> serde_json::Value) {
        match self.output {
            Output::Human => println!("{}", human()),
            Output::Json => println!("{}", record()),
        }
    }
}

impl LifecycleNotifier for ConsoleNotifier {
    fn operation_started(&self, identity: &StackIdentity, action: StackAction, template_url: Option<&str>) {
        self.emit(
            || match template_url {
                Some(url) => format!("{} {} in {} from {}", action, identity.name, identity.region, url),
                None => format!("{} {} in {}", action, identity.name, identity.region),
            },
            || json!({"kind": "started", "stack": identity.name, "region": identity.region, "action": action, "template_url": template_url}),
        );
    }

    fn status_update(&self, identity: &StackIdentity, raw_status: &str) {
        self.emit(
            || format!("{}: {}", identity.name, raw_status),
            || json!({"kind": "status", "stack": identity.name, "status": raw_status}),
        );
    }

    fn event_line(&self, identity: &StackIdentity, event: &EventRecord) {
        self.emit(
            || format!("  {}", event.line()),
            || json!({"kind": "event", "stack": identity.name, "event": event}),
        );
    }

    fn operation_finished(&self, identity: &StackIdentity, outcome: &Convergence) {
        self.emit(
            || format!("{}: {} ({})", identity.name, outcome.status(), outcome.reason()),
            || json!({"kind": "finished", "stack": identity.name, "result": outcome, "reason": outcome.reason()}),
        );
    }

    fn validation_finished(&self, identity: &StackIdentity, result: &ValidationResult) {
        self.emit(
            || {
                let mut out = format!("template valid ({})", identity.region);
                if let Some(d) = result.description.as_deref() {
                    out.push_str(&format!(": {}", d));
                }
                for p in &result.parameters {
                    out.push_str(&format!("\n  {}", p));
                }
                out
            },
            || json!({"kind": "validated", "region": identity.region, "result": result}),
        );
    }

    fn exception(&self, identity: &StackIdentity, err: &StackError) {
        match self.output {
            Output::Human => eprintln!("error: {}: {}", identity, err),
            Output::Json => println!("{}", json!({"kind": "error", "stack": identity.name, "error": err.to_string()})),
        }
    }

    fn interrupted(&self, identity: &StackIdentity) {
        self.emit(|| format!("{}: interrupted", identity.name), || json!({"kind": "interrupted", "stack": identity.name}));
    }

    fn diagnostic(&self, identity: &StackIdentity, message: &str) {
        match self.output {
            Output::Human => eprintln!("note: {}: {}", identity.name, message),
            Output::Json => println!("{}", json!({"kind": "diagnostic", "stack": identity.name, "detail": message})),
        }
    }
}
