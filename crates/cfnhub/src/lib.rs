//! Stratus cfnhub – CloudFormation client wiring behind [`StackApi`].

#![forbid(unsafe_code)]

use std::collections::HashMap;

use aws_sdk_cloudformation::{
    config::Region,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::DateTime,
    types::{OnFailure as CfnOnFailure, Stack, StackEvent, TemplateParameter as CfnParameter},
    Client,
};
use metrics::counter;
use stratus_core::{
    EventRecord, OnFailure, StackApi, StackError, StackIdentity, StackResult, StackSnapshot, TemplateParameter,
    ValidationResult,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// [`StackApi`] over the AWS CloudFormation API. One client per region, created on first use.
pub struct CfnHub {
    clients: Mutex<HashMap<String, Client>>,
    endpoint_url: Option<String>,
}

impl Default for CfnHub {
    fn default() -> Self {
        Self::new()
    }
}

impl CfnHub {
    pub fn new() -> Self {
        Self { clients: Mutex::new(HashMap::new()), endpoint_url: None }
    }

    /// Honors `STRATUS_CFN_ENDPOINT` (e.g. a local emulator) when set.
    pub fn from_env() -> Self {
        let endpoint_url = std::env::var("STRATUS_CFN_ENDPOINT").ok().filter(|s| !s.trim().is_empty());
        Self { clients: Mutex::new(HashMap::new()), endpoint_url }
    }

    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    async fn client(&self, region: &str) -> Client {
        let mut clients = self.clients.lock().await;
        if let Some(c) = clients.get(region) {
            return c.clone();
        }
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(Region::new(region.to_string()));
        if let Some(url) = self.endpoint_url.as_deref() {
            loader = loader.endpoint_url(url);
        }
        let sdk = loader.load().await;
        let client = Client::new(&sdk);
        clients.insert(region.to_string(), client.clone());
        info!(region = %region, endpoint = ?self.endpoint_url, "cloudformation client ready");
        client
    }
}

#[async_trait::async_trait]
impl StackApi for CfnHub {
    async fn create_stack(&self, identity: &StackIdentity, template_url: &str, on_failure: Option<OnFailure>) -> StackResult<()> {
        let client = self.client(&identity.region).await;
        debug!(stack = %identity.name, template_url, on_failure = ?on_failure, "CreateStack");
        let out = client
            .create_stack()
            .stack_name(&identity.name)
            .template_url(template_url)
            .set_on_failure(on_failure.map(|p| CfnOnFailure::from(p.as_str())))
            .send()
            .await
            .map_err(|e| remote_error("CreateStack", e))?;
        info!(stack = %identity.name, stack_id = ?out.stack_id(), "create requested");
        Ok(())
    }

    async fn update_stack(&self, identity: &StackIdentity, template_url: &str) -> StackResult<()> {
        let client = self.client(&identity.region).await;
        debug!(stack = %identity.name, template_url, "UpdateStack");
        let out = client
            .update_stack()
            .stack_name(&identity.name)
            .template_url(template_url)
            .send()
            .await
            .map_err(|e| remote_error("UpdateStack", e))?;
        info!(stack = %identity.name, stack_id = ?out.stack_id(), "update requested");
        Ok(())
    }

    async fn delete_stack(&self, identity: &StackIdentity) -> StackResult<()> {
        let client = self.client(&identity.region).await;
        debug!(stack = %identity.name, "DeleteStack");
        client
            .delete_stack()
            .stack_name(&identity.name)
            .send()
            .await
            .map_err(|e| remote_error("DeleteStack", e))?;
        info!(stack = %identity.name, "delete requested");
        Ok(())
    }

    async fn validate_template(&self, region: &str, template_url: &str) -> StackResult<ValidationResult> {
        let client = self.client(region).await;
        debug!(template_url, "ValidateTemplate");
        let out = client
            .validate_template()
            .template_url(template_url)
            .send()
            .await
            .map_err(|e| remote_error("ValidateTemplate", e))?;
        Ok(ValidationResult {
            description: out.description().map(str::to_string),
            parameters: out.parameters().iter().filter_map(parameter_from).collect(),
        })
    }

    async fn describe_stack(&self, identity: &StackIdentity) -> StackResult<StackSnapshot> {
        let client = self.client(&identity.region).await;
        match client.describe_stacks().stack_name(&identity.name).send().await {
            Ok(out) => Ok(snapshot_from(out.stacks())),
            Err(e) if is_missing_stack(e.code(), e.message()) => {
                debug!(stack = %identity.name, "stack does not exist");
                Ok(StackSnapshot::absent())
            }
            Err(e) => Err(remote_error("DescribeStacks", e)),
        }
    }

    async fn stack_events(&self, identity: &StackIdentity, stop_at: Option<&str>) -> StackResult<Vec<EventRecord>> {
        let client = self.client(&identity.region).await;
        let mut events = Vec::new();
        let mut next_token: Option<String> = None;
        for page in 1..=MAX_EVENT_PAGES {
            let out = client
                .describe_stack_events()
                .stack_name(&identity.name)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| remote_error("DescribeStackEvents", e))?;
            events.extend(out.stack_events().iter().filter_map(event_from));
            next_token = out.next_token().map(str::to_string);
            if !needs_next_page(&events, stop_at, next_token.is_some()) {
                return Ok(events);
            }
            debug!(stack = %identity.name, page, "reading older events");
        }
        warn!(stack = %identity.name, pages = MAX_EVENT_PAGES, stop_at = ?stop_at, "event feed truncated");
        Ok(events)
    }
}

fn remote_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> StackError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let message = match err.message() {
        Some(m) => m.to_string(),
        None => DisplayErrorContext(&err).to_string(),
    };
    counter!("stack_remote_errors_total", 1u64, "operation" => operation);
    warn!(operation, code = ?code, error = %message, "remote call failed");
    StackError::remote(operation, code, message)
}

/// Upper bound on DescribeStackEvents pages read for one tick.
const MAX_EVENT_PAGES: usize = 10;

/// Keep paging while the last-seen id has not shown up and the feed has more.
fn needs_next_page(events: &[EventRecord], stop_at: Option<&str>, more: bool) -> bool {
    match stop_at {
        Some(id) => more && !events.iter().any(|e| e.id == id),
        None => false,
    }
}

/// DescribeStacks answers a missing stack with a ValidationError rather than an empty list.
fn is_missing_stack(code: Option<&str>, message: Option<&str>) -> bool {
    code == Some("ValidationError") && message.map(|m| m.contains("does not exist")).unwrap_or(false)
}

fn snapshot_from(stacks: &[Stack]) -> StackSnapshot {
    match stacks.first() {
        Some(stack) => StackSnapshot::present(
            stack.stack_status().map(|s| s.as_str()).unwrap_or_default(),
            stack.stack_id().map(str::to_string),
        ),
        None => StackSnapshot::absent(),
    }
}

fn event_from(e: &StackEvent) -> Option<EventRecord> {
    let Some(id) = e.event_id().filter(|id| !id.is_empty()) else {
        warn!(stack = ?e.stack_name(), "skipping stack event without id");
        return None;
    };
    Some(EventRecord {
        id: id.to_string(),
        logical_resource_id: e.logical_resource_id().map(str::to_string),
        resource_type: e.resource_type().map(str::to_string),
        resource_status: e.resource_status().map(|s| s.as_str().to_string()),
        status_reason: e.resource_status_reason().map(str::to_string),
        timestamp: e.timestamp().and_then(to_utc),
    })
}

fn parameter_from(p: &CfnParameter) -> Option<TemplateParameter> {
    let key = p.parameter_key()?;
    Some(TemplateParameter {
        key: key.to_string(),
        default_value: p.default_value().map(str::to_string),
        no_echo: p.no_echo().unwrap_or(false),
        description: p.description().map(str::to_string),
    })
}

fn to_utc(ts: &DateTime) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_stack_is_detected_from_validation_error() {
        assert!(is_missing_stack(Some("ValidationError"), Some("Stack with id app does not exist")));
        assert!(!is_missing_stack(Some("ValidationError"), Some("Template format error")));
        assert!(!is_missing_stack(Some("AccessDenied"), Some("Stack with id app does not exist")));
        assert!(!is_missing_stack(None, None));
    }

    #[test]
    fn empty_stack_list_is_absent() {
        assert_eq!(snapshot_from(&[]), StackSnapshot::absent());
    }

    #[test]
    fn pages_until_last_seen_event() {
        let page = vec![EventRecord::new("b-3"), EventRecord::new("b-2")];
        assert!(!needs_next_page(&page, None, true));
        assert!(needs_next_page(&page, Some("b-1"), true));
        assert!(!needs_next_page(&page, Some("b-1"), false));
        assert!(!needs_next_page(&page, Some("b-2"), true));
    }

    #[test]
    fn smithy_timestamps_convert_to_utc() {
        let ts = DateTime::from_secs(1_714_644_003);
        let utc = to_utc(&ts).unwrap();
        assert_eq!(utc.to_rfc3339(), "2024-05-02T10:00:03+00:00");
    }

    #[test]
    fn parameters_without_key_are_dropped() {
        let p = CfnParameter::builder().default_value("x").build();
        assert!(parameter_from(&p).is_none());
        let p = CfnParameter::builder().parameter_key("Env").default_value("prod").no_echo(false).build();
        let got = parameter_from(&p).unwrap();
        assert_eq!(got.key, "Env");
        assert_eq!(got.default_value.as_deref(), Some("prod"));
        assert!(!got.no_echo);
    }

    #[tokio::test]
    async fn clients_are_cached_per_region() {
        let hub = CfnHub::new().with_endpoint_url("http://127.0.0.1:4566");
        let _ = hub.client("eu-west-1").await;
        let _ = hub.client("eu-west-1").await;
        let _ = hub.client("us-east-2").await;
        assert_eq!(hub.clients.lock().await.len(), 2);
    }
}
