//! Wire types shared by every control-plane client.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One namespace's tag keys and values. Values arrive dynamically typed.
pub type TagValues = HashMap<String, Value>;

/// All defined tags on a resource, keyed by namespace.
pub type DefinedTags = HashMap<String, TagValues>;

/// Resource kinds the scheduler knows how to act on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceKind {
    Instance,
    DbSystem,
    AutonomousDatabase,
    AnalyticsInstance,
    IntegrationInstance,
    DbNode,
    /// Anything the catalog returns that we do not manage.
    Other(String),
}

impl ResourceKind {
    /// Canonical provider spelling.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Instance => "Instance",
            Self::DbSystem => "DbSystem",
            Self::AutonomousDatabase => "AutonomousDatabase",
            Self::AnalyticsInstance => "AnalyticsInstance",
            Self::IntegrationInstance => "IntegrationInstance",
            Self::DbNode => "DbNode",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for ResourceKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "Instance" => Self::Instance,
            "DbSystem" => Self::DbSystem,
            "AutonomousDatabase" => Self::AutonomousDatabase,
            "AnalyticsInstance" => Self::AnalyticsInstance,
            "IntegrationInstance" => Self::IntegrationInstance,
            "DbNode" => Self::DbNode,
            _ => Self::Other(name),
        }
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog search hit.
///
/// Immutable once it enters the pipeline; the lifecycle state recorded here
/// is advisory and the handler re-checks it against its guard sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSummary {
    pub identifier: String,
    pub resource_type: ResourceKind,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub lifecycle_state: String,
    #[serde(default)]
    pub compartment_id: Option<String>,
    #[serde(default)]
    pub defined_tags: DefinedTags,
}

impl ResourceSummary {
    /// Tag values under `namespace`, when the resource carries any.
    #[must_use]
    pub fn tags_in(&self, namespace: &str) -> Option<&TagValues> {
        self.defined_tags.get(namespace)
    }
}

/// A structured catalog query with pagination state.
#[derive(Debug, Clone, Serialize)]
pub struct StructuredSearchRequest {
    pub query: String,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
}

impl StructuredSearchRequest {
    #[must_use]
    pub fn new(query: impl Into<String>, limit: u32) -> Self {
        Self { query: query.into(), limit, page: None }
    }
}

/// One page of search results plus the cursor for the next one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub items: Vec<ResourceSummary>,
    #[serde(default)]
    pub next_page: Option<String>,
}

/// HTTP-style status line returned by a control-plane mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiStatus {
    pub code: u16,
    pub reason: String,
}

impl ApiStatus {
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self { code, reason: reason.into() }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}

/// Power actions on a compute instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceAction {
    Start,
    Stop,
}

impl InstanceAction {
    /// Wire spelling of the action parameter.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Stop => "STOP",
        }
    }
}

/// Power actions on a database node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAction {
    Start,
    Stop,
}

impl NodeAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Stop => "STOP",
        }
    }
}
