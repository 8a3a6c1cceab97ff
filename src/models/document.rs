//! Document Module
//!
//! The untyped document shape the remote store persists, and the closed set of
//! collections it lives in.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form document body, keyed by field name.
pub type Fields = Map<String, Value>;

/// Fields stamped by the data layer; callers can never write them directly.
pub const RESERVED_FIELDS: [&str; 5] = ["id", "createdAt", "updatedAt", "createdBy", "updatedBy"];

/// True if `field` is stamped by the data layer.
pub fn is_reserved(field: &str) -> bool {
    RESERVED_FIELDS.contains(&field)
}

// == Collection ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Projects,
    Requirements,
    Regulations,
    Comments,
    Attachments,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Projects,
        Collection::Requirements,
        Collection::Regulations,
        Collection::Comments,
        Collection::Attachments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Projects => "projects",
            Collection::Requirements => "requirements",
            Collection::Regulations => "regulations",
            Collection::Comments => "comments",
            Collection::Attachments => "attachments",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown collection '{}'", s))
    }
}

// == Document ==
/// A stored document: stamped metadata plus a free-form body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Document {
    /// Creates a document stamped with the current time.
    pub fn new(id: impl Into<String>, created_by: impl Into<String>, fields: Fields) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            updated_at: now,
            created_by: created_by.into(),
            updated_by: None,
            fields,
        }
    }

    /// Looks up a field by name, including the stamped metadata fields.
    pub fn lookup(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(Value::String(self.id.clone())),
            "createdAt" => serde_json::to_value(self.created_at).ok(),
            "updatedAt" => serde_json::to_value(self.updated_at).ok(),
            "createdBy" => Some(Value::String(self.created_by.clone())),
            "updatedBy" => self.updated_by.clone().map(Value::String),
            other => self.fields.get(other).cloned(),
        }
    }

    /// Builder helper for tests and seed data.
    pub fn with_field(mut self, field: &str, value: Value) -> Self {
        self.fields.insert(field.to_string(), value);
        self
    }
}
