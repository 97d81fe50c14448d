#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use stratus_core::{
    EventRecord, OnFailure, StackAction, StackApi, StackError, StackIdentity, StackResult, StackSnapshot,
    ValidationResult,
};
use stratus_ops::{Convergence, LifecycleNotifier};

/// In-memory control plane replaying scripted replies.
///
/// Describe replies are consumed in order; the last one repeats. Event replies
/// are consumed in order; an exhausted script yields an empty feed.
#[derive(Default)]
pub struct ScriptedApi {
    describes: Mutex<VecDeque<StackResult<StackSnapshot>>>,
    events: Mutex<VecDeque<StackResult<Vec<EventRecord>>>>,
    failures: Mutex<HashMap<&'static str, StackError>>,
    stalled: Mutex<Vec<&'static str>>,
    validation: Mutex<ValidationResult>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(self, statuses: &[&str]) -> Self {
        {
            let mut q = self.describes.lock().unwrap();
            for s in statuses {
                q.push_back(Ok(StackSnapshot::present(*s, Some("arn:aws:cloudformation:eu-west-1:1:stack/app/1".into()))));
            }
        }
        self
    }

    pub fn then_absent(self) -> Self {
        self.describes.lock().unwrap().push_back(Ok(StackSnapshot::absent()));
        self
    }

    pub fn then_describe_error(self, err: StackError) -> Self {
        self.describes.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn events(self, feed: Vec<StackResult<Vec<EventRecord>>>) -> Self {
        self.events.lock().unwrap().extend(feed);
        self
    }

    pub fn fail(self, operation: &'static str, err: StackError) -> Self {
        self.failures.lock().unwrap().insert(operation, err);
        self
    }

    /// Never answer `operation`, like a request stuck in retries.
    pub fn stall(self, operation: &'static str) -> Self {
        self.stalled.lock().unwrap().push(operation);
        self
    }

    pub fn validation(self, result: ValidationResult) -> Self {
        *self.validation.lock().unwrap() = result;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.as_str() == operation).count()
    }

    async fn record(&self, operation: &'static str) -> StackResult<()> {
        self.calls.lock().unwrap().push(operation.to_string());
        let stalled = self.stalled.lock().unwrap().contains(&operation);
        if stalled {
            std::future::pending::<()>().await;
        }
        match self.failures.lock().unwrap().get(operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl StackApi for ScriptedApi {
    async fn create_stack(&self, _: &StackIdentity, _: &str, _: Option<OnFailure>) -> StackResult<()> {
        self.record("CreateStack").await
    }

    async fn update_stack(&self, _: &StackIdentity, _: &str) -> StackResult<()> {
        self.record("UpdateStack").await
    }

    async fn delete_stack(&self, _: &StackIdentity) -> StackResult<()> {
        self.record("DeleteStack").await
    }

    async fn validate_template(&self, _: &str, _: &str) -> StackResult<ValidationResult> {
        self.record("ValidateTemplate").await?;
        Ok(self.validation.lock().unwrap().clone())
    }

    async fn describe_stack(&self, _: &StackIdentity) -> StackResult<StackSnapshot> {
        self.record("DescribeStacks").await?;
        let mut q = self.describes.lock().unwrap();
        match q.len() {
            0 => Ok(StackSnapshot::absent()),
            1 => q.front().cloned().unwrap_or_else(|| Ok(StackSnapshot::absent())),
            _ => q.pop_front().unwrap_or_else(|| Ok(StackSnapshot::absent())),
        }
    }

    async fn stack_events(&self, _: &StackIdentity, _: Option<&str>) -> StackResult<Vec<EventRecord>> {
        self.record("DescribeStackEvents").await?;
        self.events.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Note {
    Started(StackAction, Option<String>),
    Status(String),
    Event(String),
    Diagnostic(String),
    Finished(Convergence),
    Validated(Vec<String>),
    Exception(StackError),
    Interrupted,
}

/// Notifier spy.
#[derive(Default)]
pub struct Recorder {
    notes: Mutex<Vec<Note>>,
}

impl Recorder {
    pub fn notes(&self) -> Vec<Note> {
        self.notes.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.notes().into_iter().filter_map(|n| match n { Note::Status(s) => Some(s), _ => None }).collect()
    }

    pub fn events(&self) -> Vec<String> {
        self.notes().into_iter().filter_map(|n| match n { Note::Event(s) => Some(s), _ => None }).collect()
    }

    pub fn finished(&self) -> Vec<Convergence> {
        self.notes().into_iter().filter_map(|n| match n { Note::Finished(c) => Some(c), _ => None }).collect()
    }

    pub fn exceptions(&self) -> Vec<StackError> {
        self.notes().into_iter().filter_map(|n| match n { Note::Exception(e) => Some(e), _ => None }).collect()
    }

    pub fn diagnostics(&self) -> Vec<String> {
        self.notes().into_iter().filter_map(|n| match n { Note::Diagnostic(d) => Some(d), _ => None }).collect()
    }

    pub fn interruptions(&self) -> usize {
        self.notes().iter().filter(|n| matches!(n, Note::Interrupted)).count()
    }

    fn push(&self, note: Note) {
        self.notes.lock().unwrap().push(note);
    }
}

impl LifecycleNotifier for Recorder {
    fn operation_started(&self, _: &StackIdentity, action: StackAction, template_url: Option<&str>) {
        self.push(Note::Started(action, template_url.map(str::to_string)));
    }

    fn status_update(&self, _: &StackIdentity, raw_status: &str) {
        self.push(Note::Status(raw_status.to_string()));
    }

    fn event_line(&self, _: &StackIdentity, event: &EventRecord) {
        self.push(Note::Event(event.id.clone()));
    }

    fn operation_finished(&self, _: &StackIdentity, outcome: &Convergence) {
        self.push(Note::Finished(outcome.clone()));
    }

    fn validation_finished(&self, _: &StackIdentity, result: &ValidationResult) {
        self.push(Note::Validated(result.parameters.iter().map(|p| p.key.clone()).collect()));
    }

    fn exception(&self, _: &StackIdentity, error: &StackError) {
        self.push(Note::Exception(error.clone()));
    }

    fn interrupted(&self, _: &StackIdentity) {
        self.push(Note::Interrupted);
    }

    fn diagnostic(&self, _: &StackIdentity, message: &str) {
        self.push(Note::Diagnostic(message.to_string()));
    }
}

pub fn events(ids: &[&str]) -> StackResult<Vec<EventRecord>> {
    Ok(ids.iter().map(|id| EventRecord::new(*id)).collect())
}

pub fn harness(api: ScriptedApi) -> (Arc<ScriptedApi>, Arc<Recorder>) {
    (Arc::new(api), Arc::new(Recorder::default()))
}
