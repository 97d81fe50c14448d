//! Stratus core types: stack identity, operation requests, snapshots and the
//! remote control-plane capability the rest of the workspace drives.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod events;
pub mod status;

pub use events::{filter_events, EventRecord};
pub use status::{LifecycleState, StatusClassifier};

/// Errors surfaced by stack operations.
///
/// Convergence failures and interruptions are outcomes, not errors; they are
/// reported by the poller as a `Convergence` value.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StackError {
    #[error("configuration: {0}")]
    Configuration(String),
    #[error("remote: {operation} failed{}: {message}", .code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
    RemoteApi {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },
}

impl StackError {
    pub fn config(msg: impl Into<String>) -> Self {
        StackError::Configuration(msg.into())
    }

    pub fn remote(operation: &'static str, code: Option<String>, message: impl Into<String>) -> Self {
        StackError::RemoteApi { operation, code, message: message.into() }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, StackError::Configuration(_))
    }
}

pub type StackResult<T> = Result<T, StackError>;

/// Reference key for a remote stack. Does not own the remote resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct StackIdentity {
    pub name: String,
    pub region: String,
}

impl StackIdentity {
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self { name: name.into(), region: region.into() }
    }

    /// Checks the fields `action` needs. Validate only needs a region.
    pub fn check(&self, action: StackAction) -> StackResult<()> {
        if self.region.trim().is_empty() {
            return Err(StackError::config("region is required"));
        }
        if action != StackAction::Validate && self.name.trim().is_empty() {
            return Err(StackError::config(format!("stack name is required for {}", action)));
        }
        Ok(())
    }
}

impl fmt::Display for StackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.region)
    }
}

/// The four lifecycle operations, closed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StackAction {
    Create,
    Update,
    Delete,
    Validate,
}

impl StackAction {
    pub const ALL: [StackAction; 4] = [StackAction::Create, StackAction::Update, StackAction::Delete, StackAction::Validate];

    /// Tag used to associate remote events with this action.
    pub fn tag(self) -> &'static str {
        match self {
            StackAction::Create => "CREATE",
            StackAction::Update => "UPDATE",
            StackAction::Delete => "DELETE",
            StackAction::Validate => "VALIDATE",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StackAction::Create => "Create",
            StackAction::Update => "Update",
            StackAction::Delete => "Delete",
            StackAction::Validate => "Validate",
        }
    }

    pub fn requires_template(self) -> bool {
        !matches!(self, StackAction::Delete)
    }
}

impl fmt::Display for StackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StackAction {
    type Err = StackError;

    /// Case-insensitive match on the exact vocabulary; surrounding whitespace is not forgiven.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StackAction::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StackError::config(format!("unrecognized action {:?} (expect Create, Update, Delete or Validate)", s)))
    }
}

/// What the remote does with a stack whose creation fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OnFailure {
    DoNothing,
    Rollback,
    Delete,
}

impl OnFailure {
    /// Sentinel the host uses for "not set".
    pub const UNSET: &'static str = "null";

    pub fn as_str(self) -> &'static str {
        match self {
            OnFailure::DoNothing => "DO_NOTHING",
            OnFailure::Rollback => "ROLLBACK",
            OnFailure::Delete => "DELETE",
        }
    }

    /// Parse a policy string; the unset sentinel or an empty string yields `None`.
    pub fn parse_policy(s: &str) -> StackResult<Option<OnFailure>> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case(Self::UNSET) {
            return Ok(None);
        }
        [OnFailure::DoNothing, OnFailure::Rollback, OnFailure::Delete]
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .map(Some)
            .ok_or_else(|| StackError::config(format!("unrecognized on-failure policy {:?} (expect DO_NOTHING, ROLLBACK, DELETE or null)", s)))
    }
}

impl fmt::Display for OnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the template lives in object storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateLocation {
    pub storage_endpoint: String,
    pub bucket: String,
    pub key: String,
    pub object_version: Option<String>,
}

impl TemplateLocation {
    /// Location in the default storage endpoint of `region`.
    pub fn in_region(region: &str, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            storage_endpoint: default_storage_endpoint(region),
            bucket: bucket.into(),
            key: key.into(),
            object_version: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.storage_endpoint = endpoint.into();
        self
    }

    /// Empty versions are treated as unset.
    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.object_version = version.filter(|v| !v.trim().is_empty());
        self
    }

    pub fn check(&self) -> StackResult<()> {
        if self.bucket.trim().is_empty() {
            return Err(StackError::config("template bucket is required"));
        }
        if self.key.trim().is_empty() {
            return Err(StackError::config("template key is required"));
        }
        if self.storage_endpoint.trim().is_empty() {
            return Err(StackError::config("template storage endpoint is required"));
        }
        Ok(())
    }

    /// Fetchable template URL, `https://<endpoint>/<bucket>/<key>[?versionId=<v>]`.
    pub fn url(&self) -> String {
        let endpoint = self.storage_endpoint.trim_end_matches('/');
        let endpoint = endpoint.strip_prefix("https://").unwrap_or(endpoint);
        let key = self.key.trim_start_matches('/');
        match self.object_version.as_deref() {
            Some(v) => format!("https://{}/{}/{}?versionId={}", endpoint, self.bucket, key, v),
            None => format!("https://{}/{}/{}", endpoint, self.bucket, key),
        }
    }
}

/// Object storage endpoint serving `region`.
pub fn default_storage_endpoint(region: &str) -> String {
    match region {
        "us-east-1" => "s3.amazonaws.com".to_string(),
        r if r.starts_with("cn-") => format!("s3.{}.amazonaws.com.cn", r),
        r => format!("s3.{}.amazonaws.com", r),
    }
}

/// One lifecycle request, constructed once per invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationRequest {
    Create { template: TemplateLocation, on_failure: Option<OnFailure> },
    Update { template: TemplateLocation },
    Delete,
    Validate { template: TemplateLocation },
}

impl OperationRequest {
    pub fn action(&self) -> StackAction {
        match self {
            OperationRequest::Create { .. } => StackAction::Create,
            OperationRequest::Update { .. } => StackAction::Update,
            OperationRequest::Delete => StackAction::Delete,
            OperationRequest::Validate { .. } => StackAction::Validate,
        }
    }

    pub fn template(&self) -> Option<&TemplateLocation> {
        match self {
            OperationRequest::Create { template, .. }
            | OperationRequest::Update { template }
            | OperationRequest::Validate { template } => Some(template),
            OperationRequest::Delete => None,
        }
    }

    /// Build a request from raw host values. Fails before any remote call is possible.
    pub fn resolve(action: &str, template: Option<TemplateLocation>, on_failure: &str) -> StackResult<Self> {
        let action: StackAction = action.parse()?;
        let template = if action.requires_template() {
            let t = template.ok_or_else(|| StackError::config(format!("{} requires a template location", action)))?;
            t.check()?;
            Some(t)
        } else {
            None
        };
        Ok(match (action, template) {
            (StackAction::Create, Some(template)) => {
                OperationRequest::Create { template, on_failure: OnFailure::parse_policy(on_failure)? }
            }
            (StackAction::Update, Some(template)) => OperationRequest::Update { template },
            (StackAction::Validate, Some(template)) => OperationRequest::Validate { template },
            (StackAction::Delete, _) => OperationRequest::Delete,
            (a, None) => return Err(StackError::config(format!("{} requires a template location", a))),
        })
    }
}

/// Raw inbound parameters as supplied by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackParams {
    pub stack_name: String,
    pub region: String,
    pub action: String,
    pub bucket: Option<String>,
    pub key: Option<String>,
    pub object_version: Option<String>,
    pub storage_endpoint: Option<String>,
    pub on_failure: Option<String>,
}

impl StackParams {
    /// Validate and split into identity + request.
    pub fn resolve(&self) -> StackResult<(StackIdentity, OperationRequest)> {
        let action: StackAction = self.action.parse()?;
        let identity = StackIdentity::new(self.stack_name.trim(), self.region.trim());
        identity.check(action)?;
        let template = match (self.bucket.as_deref(), self.key.as_deref()) {
            (None, None) => None,
            (bucket, key) => {
                let mut t = TemplateLocation::in_region(&identity.region, bucket.unwrap_or(""), key.unwrap_or(""))
                    .with_version(self.object_version.clone());
                if let Some(ep) = self.storage_endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
                    t = t.with_endpoint(ep.trim());
                }
                Some(t)
            }
        };
        let on_failure = self.on_failure.as_deref().unwrap_or(OnFailure::UNSET);
        let request = OperationRequest::resolve(&self.action, template, on_failure)?;
        Ok((identity, request))
    }
}

/// Result of a single status probe. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackSnapshot {
    pub raw_status: String,
    pub stack_id: Option<String>,
    pub exists: bool,
}

impl StackSnapshot {
    pub fn present(raw_status: impl Into<String>, stack_id: Option<String>) -> Self {
        Self { raw_status: raw_status.into(), stack_id, exists: true }
    }

    /// The remote reports no matching stack.
    pub fn absent() -> Self {
        Self { raw_status: String::new(), stack_id: None, exists: false }
    }
}

/// A parameter declared by a validated template.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateParameter {
    pub key: String,
    pub default_value: Option<String>,
    pub no_echo: bool,
    pub description: Option<String>,
}

impl fmt::Display for TemplateParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)?;
        match (self.no_echo, self.default_value.as_deref()) {
            (true, _) => f.write_str(" = ****")?,
            (false, Some(d)) => write!(f, " = {}", d)?,
            (false, None) => {}
        }
        if let Some(d) = self.description.as_deref() {
            write!(f, " ({})", d)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationResult {
    pub description: Option<String>,
    pub parameters: Vec<TemplateParameter>,
}

/// The remote control plane. One call per method, no waiting, no retries.
///
/// Implementations address the region carried by the identity.
#[async_trait::async_trait]
pub trait StackApi: Send + Sync {
    async fn create_stack(&self, identity: &StackIdentity, template_url: &str, on_failure: Option<OnFailure>) -> StackResult<()>;
    async fn update_stack(&self, identity: &StackIdentity, template_url: &str) -> StackResult<()>;
    async fn delete_stack(&self, identity: &StackIdentity) -> StackResult<()>;
    async fn validate_template(&self, region: &str, template_url: &str) -> StackResult<ValidationResult>;
    /// Absent stacks are reported as `exists = false`, not as an error.
    async fn describe_stack(&self, identity: &StackIdentity) -> StackResult<StackSnapshot>;
    /// Raw event feed, newest first. Older pages are read until an event with id
    /// `stop_at` has been seen; with no `stop_at` only the newest page is read.
    async fn stack_events(&self, identity: &StackIdentity, stop_at: Option<&str>) -> StackResult<Vec<EventRecord>>;
}
