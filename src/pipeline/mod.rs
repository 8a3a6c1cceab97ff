//! AI Pipeline Module
//!
//! Client for the hosted requirement-analysis pipeline, a bounded and
//! cancellable run poller, and extraction of the rewritten requirements from
//! the pipeline's final output.

pub mod analysis;
pub mod client;
pub mod poller;

use std::time::Duration;

use thiserror::Error;

pub use analysis::{extract_analysis, AnalyzedRequirement};
pub use client::{
    AnalysisRequest, HttpPipelineClient, PipelineApi, PipelineInput, PipelineRun, RunHandle,
    RunState, UploadFile,
};
pub use poller::{AnalysisState, AnalysisTask, PollPolicy};

// == Pipeline Error ==
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Credentials or pipeline id missing from configuration
    #[error("Pipeline not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid pipeline input: {0}")]
    InvalidInput(String),

    #[error("Pipeline request failed: {0}")]
    Network(String),

    /// Non-success HTTP status from the pipeline API
    #[error("Pipeline API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Malformed pipeline response: {0}")]
    Parse(String),

    /// The run itself reported FAILED
    #[error("Pipeline run {0} failed")]
    RunFailed(String),

    #[error("Pipeline run still pending after {0} status checks")]
    AttemptsExhausted(u32),

    #[error("Pipeline run still pending after {0:?}")]
    DeadlineExceeded(Duration),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

// == Settings ==
/// Connection settings for the pipeline API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineSettings {
    /// Base URL without trailing slash
    pub base_url: String,
    pub api_key: String,
    pub user_id: String,
    pub saved_item_id: String,
}

impl PipelineSettings {
    /// True when every credential needed to start a run is present.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.user_id.is_empty() && !self.saved_item_id.is_empty()
    }
}
