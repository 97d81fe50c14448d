//! Stratus Ops: drive a stack through create/update/delete/validate and wait
//! for the remote control plane to converge.

#![forbid(unsafe_code)]

use std::future::Future;

use tokio_util::sync::CancellationToken;

pub mod client;
pub mod config;
pub mod notify;
pub mod orchestrator;
pub mod poller;

pub use client::StackOperationClient;
pub use config::PollConfig;
pub use notify::{FanoutNotifier, LifecycleNotifier, TracingNotifier};
pub use orchestrator::{Orchestrator, Outcome, OutcomeStatus};
pub use poller::{Convergence, ConvergencePoller};

/// Cancellation handle for an in-flight operation. Clones share one signal.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Drive `fut` unless cancelled first; `None` means it was abandoned.
    pub async fn or_cancel<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            v = fut => Some(v),
        }
    }
}
