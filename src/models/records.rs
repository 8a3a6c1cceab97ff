//! Typed Records
//!
//! Closed set of record shapes stored in each collection. Records convert to and
//! from `Document` through serde; missing optional fields fall back to the
//! defaults a freshly created record would have.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::{is_reserved, Collection, Document, Fields};

// == Record Trait ==
/// A typed view of the documents in one collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn meta(&self) -> &Meta;

    fn id(&self) -> &str {
        &self.meta().id
    }
}

/// Converts a stored document into a typed record.
pub fn from_document<T: Record>(document: Document) -> Result<T, serde_json::Error> {
    serde_json::from_value(serde_json::to_value(document)?)
}

/// Extracts the writable body of a record, dropping stamped metadata.
pub fn record_fields<T: Record>(record: &T) -> Result<Fields, serde_json::Error> {
    match serde_json::to_value(record)? {
        Value::Object(mut map) => {
            map.retain(|field, _| !is_reserved(field));
            Ok(map)
        }
        _ => Ok(Fields::new()),
    }
}

// == Metadata ==
/// Fields stamped by the data layer on every document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Meta {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

// == Enumerations ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Done,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Planning,
    Active,
    OnHold,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    #[default]
    Product,
    System,
    Subsystem,
    Component,
    Interface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    #[default]
    Markdown,
    Html,
    PlainText,
    Pdf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequirementFormat {
    #[serde(rename = "EARS")]
    Ears,
    #[serde(rename = "INCOSE")]
    Incose,
}

// == Supporting Types ==
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    pub view: Vec<String>,
    pub edit: Vec<String>,
    pub admin: Vec<String>,
    pub public: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectSettings {
    pub is_public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Fields>,
}

/// One message of the AI conversation kept on a requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMessage {
    pub role: OutputRole,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementAnalysis {
    #[serde(rename = "rewrittenEARS")]
    pub rewritten_ears: String,
    #[serde(rename = "rewrittenINCOSE")]
    pub rewritten_incose: String,
    pub selected_format: RequirementFormat,
    #[serde(default)]
    pub feedback: Vec<String>,
    #[serde(default)]
    pub compliance_issues: Vec<String>,
}

// == Project ==
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    #[serde(flatten)]
    pub meta: Meta,
    pub title: String,
    #[serde(rename = "type")]
    pub project_type: ProjectType,
    pub requirement_ids: Vec<String>,
    pub regulation_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: ProjectStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub members: Vec<String>,
    pub owner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<ProjectSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Fields>,
    pub permissions: Permissions,
}

impl Record for Project {
    const COLLECTION: Collection = Collection::Projects;

    fn meta(&self) -> &Meta {
        &self.meta
    }
}

// == Requirement ==
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Requirement {
    #[serde(flatten)]
    pub meta: Meta,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub assigned_to: Vec<String>,
    pub project_id: String,
    pub regulation_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub children_ids: Vec<String>,
    pub tags: Vec<String>,
    pub output: Vec<OutputMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<RequirementAnalysis>,
    pub permissions: Permissions,
}

impl Record for Requirement {
    const COLLECTION: Collection = Collection::Requirements;

    fn meta(&self) -> &Meta {
        &self.meta
    }
}

// == Regulation ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Regulation {
    #[serde(flatten)]
    pub meta: Meta,
    pub title: String,
    pub content: String,
    pub version: u32,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_viewed: Option<DateTime<Utc>>,
    pub format: DocumentFormat,
}

impl Default for Regulation {
    fn default() -> Self {
        Self {
            meta: Meta::default(),
            title: String::new(),
            content: String::new(),
            version: 1,
            project_id: String::new(),
            parent_id: None,
            last_viewed: None,
            format: DocumentFormat::Markdown,
        }
    }
}

impl Record for Regulation {
    const COLLECTION: Collection = Collection::Regulations;

    fn meta(&self) -> &Meta {
        &self.meta
    }
}

// == Comment ==
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Comment {
    #[serde(flatten)]
    pub meta: Meta,
    pub content: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub mentions: Vec<String>,
    /// Reaction emoji to the users who left it
    pub reactions: BTreeMap<String, Vec<String>>,
}

impl Record for Comment {
    const COLLECTION: Collection = Collection::Comments;

    fn meta(&self) -> &Meta {
        &self.meta
    }
}

// == Attachment ==
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Attachment {
    #[serde(flatten)]
    pub meta: Meta,
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: u64,
    pub uploaded_by: String,
}

impl Record for Attachment {
    const COLLECTION: Collection = Collection::Attachments;

    fn meta(&self) -> &Meta {
        &self.meta
    }
}
