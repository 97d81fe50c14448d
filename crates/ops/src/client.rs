use std::sync::Arc;

use stratus_core::{
    EventRecord, OnFailure, StackAction, StackApi, StackIdentity, StackResult, StackSnapshot, TemplateLocation,
    ValidationResult,
};
use tracing::debug;

use crate::LifecycleNotifier;

/// Issues lifecycle requests against the remote API. Never waits for convergence.
///
/// Mutating calls announce themselves to the notifier before the request goes out.
#[derive(Clone)]
pub struct StackOperationClient {
    api: Arc<dyn StackApi>,
    notifier: Arc<dyn LifecycleNotifier>,
}

impl StackOperationClient {
    pub fn new(api: Arc<dyn StackApi>, notifier: Arc<dyn LifecycleNotifier>) -> Self {
        Self { api, notifier }
    }

    pub fn notifier(&self) -> &dyn LifecycleNotifier {
        self.notifier.as_ref()
    }

    pub async fn create(&self, identity: &StackIdentity, template: &TemplateLocation, on_failure: Option<OnFailure>) -> StackResult<()> {
        let url = template.url();
        self.notifier.operation_started(identity, StackAction::Create, Some(&url));
        self.api.create_stack(identity, &url, on_failure).await
    }

    pub async fn update(&self, identity: &StackIdentity, template: &TemplateLocation) -> StackResult<()> {
        let url = template.url();
        self.notifier.operation_started(identity, StackAction::Update, Some(&url));
        self.api.update_stack(identity, &url).await
    }

    pub async fn delete(&self, identity: &StackIdentity) -> StackResult<()> {
        self.notifier.operation_started(identity, StackAction::Delete, None);
        self.api.delete_stack(identity).await
    }

    /// Synchronous on the remote side; returns the declared parameters.
    pub async fn validate(&self, identity: &StackIdentity, template: &TemplateLocation) -> StackResult<ValidationResult> {
        let url = template.url();
        self.notifier.operation_started(identity, StackAction::Validate, Some(&url));
        self.api.validate_template(&identity.region, &url).await
    }

    pub async fn describe(&self, identity: &StackIdentity) -> StackResult<StackSnapshot> {
        let snapshot = self.api.describe_stack(identity).await?;
        debug!(stack = %identity.name, status = %snapshot.raw_status, exists = snapshot.exists, "describe");
        Ok(snapshot)
    }

    pub async fn fetch_events(&self, identity: &StackIdentity, since: Option<&str>) -> StackResult<Vec<EventRecord>> {
        self.api.stack_events(identity, since).await
    }
}
