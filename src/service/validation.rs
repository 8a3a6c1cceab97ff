//! Validation schemas
//!
//! Optional per-collection field rules, checked before a write reaches the store.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::models::Fields;

/// Predicate for `Rule::Custom`; receives the field value if present.
pub type CustomCheck = Arc<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum Rule {
    /// Present, not null, not an empty string
    Required,
    /// When present and truthy, its text must match the pattern
    Format(Regex),
    /// When present, must be a number within `[min, max]`
    Range { min: f64, max: f64 },
    /// Fails when the predicate returns false
    Custom(CustomCheck),
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Required => f.write_str("Required"),
            Rule::Format(re) => write!(f, "Format({})", re.as_str()),
            Rule::Range { min, max } => write!(f, "Range({}..={})", min, max),
            Rule::Custom(_) => f.write_str("Custom"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: String,
    pub rule: Rule,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationSchema {
    rules: Vec<FieldRule>,
}

impl ValidationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, field: impl Into<String>, rule: Rule, message: impl Into<String>) -> Self {
        self.rules.push(FieldRule {
            field: field.into(),
            rule,
            message: message.into(),
        });
        self
    }

    pub fn required(self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.rule(field, Rule::Required, message)
    }

    pub fn format(
        self,
        field: impl Into<String>,
        pattern: &str,
        message: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(self.rule(field, Rule::Format(Regex::new(pattern)?), message))
    }

    pub fn range(self, field: impl Into<String>, min: f64, max: f64, message: impl Into<String>) -> Self {
        self.rule(field, Rule::Range { min, max }, message)
    }

    pub fn custom<F>(self, field: impl Into<String>, check: F, message: impl Into<String>) -> Self
    where
        F: Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    {
        self.rule(field, Rule::Custom(Arc::new(check)), message)
    }

    /// Checks a complete document body. Returns every failed rule's message.
    pub fn check(&self, fields: &Fields) -> Vec<String> {
        self.rules
            .iter()
            .filter(|rule| !passes(&rule.rule, fields.get(&rule.field)))
            .map(|rule| rule.message.clone())
            .collect()
    }

    /// Checks a partial body: rules on fields the merge does not touch are skipped.
    pub fn check_present(&self, fields: &Fields) -> Vec<String> {
        self.rules
            .iter()
            .filter(|rule| fields.contains_key(&rule.field))
            .filter(|rule| !passes(&rule.rule, fields.get(&rule.field)))
            .map(|rule| rule.message.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn passes(rule: &Rule, value: Option<&Value>) -> bool {
    match rule {
        Rule::Required => match value {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        },
        Rule::Format(pattern) => match value {
            Some(v) if is_truthy(v) => match v {
                Value::String(s) => pattern.is_match(s),
                other => pattern.is_match(&other.to_string()),
            },
            _ => true,
        },
        Rule::Range { min, max } => match value {
            None | Some(Value::Null) => true,
            Some(v) => v.as_f64().is_some_and(|x| x >= *min && x <= *max),
        },
        Rule::Custom(check) => check(value),
    }
}
