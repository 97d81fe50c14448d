//! Top-level entry point: resolve the request, issue it, wait if it converges.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use serde::{Deserialize, Serialize};
use stratus_core::{OperationRequest, StackAction, StackApi, StackIdentity, StackParams, StackResult, ValidationResult};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::{CancelHandle, Convergence, ConvergencePoller, LifecycleNotifier, PollConfig, StackOperationClient};

/// Final status of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    SuccessWithProblems,
    Interrupted,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::SuccessWithProblems => "success_with_problems",
            OutcomeStatus::Interrupted => "interrupted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    /// How the wait ended, for actions that converge.
    pub convergence: Option<Convergence>,
    pub validation: Option<ValidationResult>,
}

impl Outcome {
    fn problems() -> Self {
        Self { status: OutcomeStatus::SuccessWithProblems, convergence: None, validation: None }
    }

    fn interrupted() -> Self {
        Self { status: OutcomeStatus::Interrupted, convergence: Some(Convergence::Interrupted), validation: None }
    }

    fn validated(result: ValidationResult) -> Self {
        Self { status: OutcomeStatus::Success, convergence: None, validation: Some(result) }
    }

    fn converged(c: Convergence) -> Self {
        let status = match &c {
            Convergence::Interrupted => OutcomeStatus::Interrupted,
            c if c.is_success() => OutcomeStatus::Success,
            _ => OutcomeStatus::SuccessWithProblems,
        };
        Self { status, convergence: Some(c), validation: None }
    }
}

/// Runs one lifecycle invocation at a time; each call owns its own identity and poll state.
pub struct Orchestrator {
    client: StackOperationClient,
    config: PollConfig,
    cancel: CancelHandle,
}

impl Orchestrator {
    pub fn new(api: Arc<dyn StackApi>, notifier: Arc<dyn LifecycleNotifier>) -> Self {
        Self { client: StackOperationClient::new(api, notifier), config: PollConfig::default(), cancel: CancelHandle::new() }
    }

    pub fn with_config(mut self, config: PollConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Resolve raw host parameters, then execute. Configuration errors are returned
    /// before any remote call is made.
    pub async fn run(&self, params: &StackParams) -> StackResult<Outcome> {
        let (identity, request) = params.resolve()?;
        Ok(self.execute(&identity, &request).await)
    }

    /// Execute a resolved request. Errors end up in the `exception` notification and
    /// a `SuccessWithProblems` outcome; nothing propagates.
    pub async fn execute(&self, identity: &StackIdentity, request: &OperationRequest) -> Outcome {
        let action = request.action();
        let op = Uuid::new_v4();
        let span = info_span!("stack_operation", op = %op, stack = %identity.name, region = %identity.region, action = %action);
        let started = Instant::now();

        let outcome = match self.dispatch(identity, request).instrument(span).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.client.notifier().exception(identity, &e);
                Outcome::problems()
            }
        };

        histogram!(
            "stack_operation_secs",
            started.elapsed().as_secs_f64(),
            "action" => action.as_str(),
            "outcome" => outcome.status.as_str()
        );
        info!(op = %op, stack = %identity.name, action = %action, status = outcome.status.as_str(), "operation complete");
        outcome
    }

    async fn dispatch(&self, identity: &StackIdentity, request: &OperationRequest) -> StackResult<Outcome> {
        identity.check(request.action())?;
        if let Some(t) = request.template() {
            t.check()?;
        }
        if self.cancel.is_cancelled() {
            return Ok(self.interrupted(identity));
        }

        let poller = ConvergencePoller::new(self.client.clone(), self.config.interval, self.cancel.clone());
        // A new stack has no history; existing ones may carry events from earlier runs.
        let since = match request {
            OperationRequest::Update { .. } | OperationRequest::Delete => poller.baseline(identity).await,
            OperationRequest::Create { .. } | OperationRequest::Validate { .. } => None,
        };

        let issued = match request {
            OperationRequest::Validate { template } => {
                let Some(result) = self.cancel.or_cancel(self.client.validate(identity, template)).await else {
                    return Ok(self.interrupted(identity));
                };
                let result = result?;
                self.client.notifier().validation_finished(identity, &result);
                return Ok(Outcome::validated(result));
            }
            OperationRequest::Create { template, on_failure } => {
                self.cancel.or_cancel(self.client.create(identity, template, *on_failure)).await
            }
            OperationRequest::Update { template } => self.cancel.or_cancel(self.client.update(identity, template)).await,
            OperationRequest::Delete => self.cancel.or_cancel(self.client.delete(identity)).await,
        };
        match issued {
            Some(res) => res?,
            None => return Ok(self.interrupted(identity)),
        }
        self.converge(identity, &poller, request.action(), since).await
    }

    fn interrupted(&self, identity: &StackIdentity) -> Outcome {
        self.client.notifier().interrupted(identity);
        Outcome::interrupted()
    }

    async fn converge(
        &self,
        identity: &StackIdentity,
        poller: &ConvergencePoller,
        action: StackAction,
        since: Option<String>,
    ) -> StackResult<Outcome> {
        let convergence = match self.config.timeout {
            None => poller.wait(identity, action, since).await?,
            Some(limit) => match tokio::time::timeout(limit, poller.wait(identity, action, since)).await {
                Ok(res) => res?,
                Err(_) => {
                    let timed_out = Convergence::TimedOut { after_secs: limit.as_secs() };
                    self.client.notifier().operation_finished(identity, &timed_out);
                    timed_out
                }
            },
        };
        Ok(Outcome::converged(convergence))
    }
}
