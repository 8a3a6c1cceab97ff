//! Update Module
//!
//! Partial merges and atomic field operations, and how a store applies them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::document::{is_reserved, Document, Fields};

// == Field Operation ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldOp {
    /// Overwrite the field
    Set,
    /// Add a number to the field, a missing field counting as 0
    Increment,
    /// Add elements not already present
    #[serde(alias = "append-to-array")]
    Append,
    /// Drop every element equal to one of the given values
    #[serde(alias = "remove-from-array")]
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOperation {
    pub field: String,
    #[serde(rename = "operation")]
    pub op: FieldOp,
    pub value: Value,
}

impl FieldOperation {
    pub fn new(field: impl Into<String>, op: FieldOp, value: Value) -> Self {
        Self { field: field.into(), op, value }
    }

    pub fn set(field: impl Into<String>, value: Value) -> Self {
        Self { field: field.into(), op: FieldOp::Set, value }
    }

    pub fn increment(field: impl Into<String>, by: impl Into<Number>) -> Self {
        Self { field: field.into(), op: FieldOp::Increment, value: Value::Number(by.into()) }
    }

    pub fn append(field: impl Into<String>, value: Value) -> Self {
        Self { field: field.into(), op: FieldOp::Append, value }
    }

    pub fn remove(field: impl Into<String>, value: Value) -> Self {
        Self { field: field.into(), op: FieldOp::Remove, value }
    }

    /// Checks the operation can be applied to any document.
    pub fn validate(&self) -> Result<(), String> {
        if self.field.is_empty() {
            return Err("Field name cannot be empty".to_string());
        }
        if is_reserved(&self.field) {
            return Err(format!("Field '{}' is managed by the data layer", self.field));
        }
        if self.op == FieldOp::Increment && !self.value.is_number() {
            return Err("Increment operation requires a numeric value".to_string());
        }
        Ok(())
    }

    /// Applies the operation to `fields`.
    pub fn apply(&self, fields: &mut Fields) -> Result<(), String> {
        self.validate()?;
        match self.op {
            FieldOp::Set => {
                fields.insert(self.field.clone(), self.value.clone());
            }
            FieldOp::Increment => {
                let current = fields.get(&self.field).cloned().unwrap_or(Value::from(0));
                let sum = add_numbers(&current, &self.value).ok_or_else(|| {
                    format!("Field '{}' is not numeric and cannot be incremented", self.field)
                })?;
                fields.insert(self.field.clone(), sum);
            }
            FieldOp::Append => {
                let mut items = existing_array(fields, &self.field);
                for element in elements(&self.value) {
                    if !items.contains(&element) {
                        items.push(element);
                    }
                }
                fields.insert(self.field.clone(), Value::Array(items));
            }
            FieldOp::Remove => {
                let removals = elements(&self.value);
                let mut items = existing_array(fields, &self.field);
                items.retain(|item| !removals.contains(item));
                fields.insert(self.field.clone(), Value::Array(items));
            }
        }
        Ok(())
    }
}

fn existing_array(fields: &Fields, field: &str) -> Vec<Value> {
    match fields.get(field) {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

/// An array value contributes its elements; anything else is a single element.
fn elements(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

fn add_numbers(current: &Value, delta: &Value) -> Option<Value> {
    let (Value::Number(a), Value::Number(b)) = (current, delta) else {
        return None;
    };
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Some(Value::from(sum));
        }
    }
    let sum = a.as_f64()? + b.as_f64()?;
    Number::from_f64(sum).map(Value::Number)
}

// == Update ==
/// Either a plain partial merge or an ordered list of field operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Update {
    Operations(Vec<FieldOperation>),
    Merge(Fields),
}

impl Update {
    pub fn is_empty(&self) -> bool {
        match self {
            Update::Operations(ops) => ops.is_empty(),
            Update::Merge(fields) => fields.is_empty(),
        }
    }

    /// Normalizes to field operations; a merge becomes one `set` per field.
    pub fn into_operations(self) -> Vec<FieldOperation> {
        match self {
            Update::Operations(ops) => ops,
            Update::Merge(fields) => fields
                .into_iter()
                .map(|(field, value)| FieldOperation::set(field, value))
                .collect(),
        }
    }
}

// == Patch ==
/// What the store applies: the operations plus the updater stamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Patch {
    pub operations: Vec<FieldOperation>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl Patch {
    pub fn new(operations: Vec<FieldOperation>, updated_by: impl Into<String>) -> Self {
        Self {
            operations,
            updated_by: updated_by.into(),
            updated_at: Utc::now(),
        }
    }

    /// Applies every operation to a copy of `document`; all or nothing.
    pub fn apply_to(&self, document: &Document) -> Result<Document, String> {
        let mut updated = document.clone();
        for operation in &self.operations {
            operation.apply(&mut updated.fields)?;
        }
        updated.updated_at = self.updated_at;
        updated.updated_by = Some(self.updated_by.clone());
        Ok(updated)
    }
}
