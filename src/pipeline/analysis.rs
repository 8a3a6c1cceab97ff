//! Extraction of rewritten requirements from pipeline output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Fenced JSON block in the model's answer
static JSON_FENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```json([\s\S]*?)```").expect("Invalid JSON fence regex"));

/// One requirement as rewritten by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzedRequirement {
    #[serde(rename = "Requirement ID")]
    pub requirement_id: String,
    #[serde(rename = "EARS Pattern")]
    pub ears_pattern: String,
    #[serde(rename = "Original Requirement")]
    pub original: String,
    #[serde(rename = "Final Requirement")]
    pub rewritten: String,
    /// Semicolon-separated remarks
    #[serde(rename = "Requirement Feedback")]
    pub feedback: String,
}

impl AnalyzedRequirement {
    pub fn feedback_items(&self) -> Vec<&str> {
        self.feedback
            .split(';')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect()
    }
}

/// Parses the requirement list out of the pipeline's final output.
///
/// Looks for a fenced ```json block first and falls back to the whole text.
/// Anything unparseable yields an empty list.
pub fn extract_analysis(output: &str) -> Vec<AnalyzedRequirement> {
    let candidate = JSON_FENCE_PATTERN
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(output)
        .trim();

    if candidate.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str(candidate) {
        Ok(requirements) => requirements,
        Err(e) => {
            warn!("Could not parse pipeline output as requirements: {}", e);
            Vec::new()
        }
    }
}
