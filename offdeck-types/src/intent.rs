//! Mutation intents queued while a client is offline.
//!
//! An intent is an operation (create, update, delete) against one resource
//! of a presentation: the container itself, one of its pages, or an element
//! on a page. The payload is a sum type over the resource kind, so the
//! processor dispatches on it without inspecting JSON shapes.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The mutation an intent performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Queue priority before any batch tiebreaker is added.
    ///
    /// Deletes drain first so later intents never target entities that are
    /// already gone upstream.
    #[must_use]
    pub const fn base_priority(&self) -> i64 {
        match self {
            Self::Delete => 0,
            Self::Create => 1,
            Self::Update => 2,
        }
    }

    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(Error::InvalidEnum {
                kind: "operation",
                value: other.to_string(),
            }),
        }
    }
}

/// The kind of resource an intent targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Container,
    Page,
    Element,
}

impl ResourceKind {
    /// All kinds, in containment order.
    pub const ALL: [ResourceKind; 3] = [Self::Container, Self::Page, Self::Element];

    /// Stable storage representation, also the payload tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Page => "page",
            Self::Element => "element",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "container" => Ok(Self::Container),
            "page" => Ok(Self::Page),
            "element" => Ok(Self::Element),
            other => Err(Error::UnsupportedResource(other.to_string())),
        }
    }
}

/// Lifecycle status of a queued intent.
///
/// The store only moves an intent along these edges; every transition is a
/// conditional update on the current status.
///
/// ```text
/// PENDING ──► PROCESSING ──► COMPLETED
///    ▲            │
///    ├────────────┘ (failed, attempts left)
///    │            │
///    └── FAILED ◄─┘ (attempts exhausted; re-armed by maintenance)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl IntentStatus {
    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(Error::InvalidEnum {
                kind: "intent status",
                value: other.to_string(),
            }),
        }
    }
}

/// Fields needed to mutate a container record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerPayload {
    pub id: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Fields needed to mutate a page record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagePayload {
    pub id: String,
    pub container_id: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Fields needed to mutate an element record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementPayload {
    pub id: String,
    pub page_id: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// The resource-specific body of an intent, tagged by resource kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource", rename_all = "snake_case")]
pub enum IntentPayload {
    Container(ContainerPayload),
    Page(PagePayload),
    Element(ElementPayload),
}

impl IntentPayload {
    /// The resource kind this payload targets.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Container(_) => ResourceKind::Container,
            Self::Page(_) => ResourceKind::Page,
            Self::Element(_) => ResourceKind::Element,
        }
    }

    /// Id of the targeted record.
    #[must_use]
    pub fn target_id(&self) -> &str {
        match self {
            Self::Container(p) => &p.id,
            Self::Page(p) => &p.id,
            Self::Element(p) => &p.id,
        }
    }

    /// Id of the owning record, if the resource has one.
    #[must_use]
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Self::Container(_) => None,
            Self::Page(p) => Some(&p.container_id),
            Self::Element(p) => Some(&p.page_id),
        }
    }

    /// The document fields carried by the payload.
    #[must_use]
    pub fn data(&self) -> &serde_json::Value {
        match self {
            Self::Container(p) => &p.data,
            Self::Page(p) => &p.data,
            Self::Element(p) => &p.data,
        }
    }

    /// Serializes the payload for storage.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a stored payload.
    ///
    /// A payload whose `resource` tag is missing or names an unknown kind
    /// yields [`Error::UnsupportedResource`] rather than a generic decode error.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    /// Decodes a payload that has already been parsed into a JSON value.
    pub fn from_value(value: serde_json::Value) -> crate::Result<Self> {
        match value.get("resource").and_then(|r| r.as_str()) {
            Some(tag) => {
                tag.parse::<ResourceKind>()?;
            }
            None => return Err(Error::UnsupportedResource("<untagged>".to_string())),
        }
        Ok(serde_json::from_value(value)?)
    }
}
