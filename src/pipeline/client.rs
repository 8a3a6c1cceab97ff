//! Pipeline API Client
//!
//! Starts analysis runs, reads their status and uploads regulation PDFs over
//! HTTPS with a bearer key.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::{PipelineError, PipelineSettings, Result};

// == Input Slots ==
pub const REGULATION_INPUT: &str = "Upload Regulation Document Here - PDF Format Only";
pub const SYSTEM_NAME_INPUT: &str = "System Name [Product/Feature/System/Subsystem/Component]";
pub const OBJECTIVE_INPUT: &str = "Objective:";
pub const REQUIREMENT_INPUT: &str = "Requirement: ";

/// One named input of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInput {
    pub input_name: String,
    pub value: String,
}

impl PipelineInput {
    pub fn new(input_name: &str, value: impl Into<String>) -> Self {
        Self {
            input_name: input_name.to_string(),
            value: value.into(),
        }
    }
}

// == Analysis Request ==
/// What the user asked the pipeline to analyze.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisRequest {
    pub requirement: String,
    /// Names returned by `upload_files`; only the first is passed on
    pub regulation_files: Vec<String>,
    pub system_name: Option<String>,
    pub objective: Option<String>,
}

impl AnalysisRequest {
    pub fn new(requirement: impl Into<String>) -> Self {
        Self {
            requirement: requirement.into(),
            ..Self::default()
        }
    }

    /// Maps the request onto the pipeline's input slots, skipping empty values.
    pub fn pipeline_inputs(&self) -> Vec<PipelineInput> {
        let mut inputs = Vec::with_capacity(4);
        if let Some(file) = self.regulation_files.iter().find(|f| !f.trim().is_empty()) {
            inputs.push(PipelineInput::new(REGULATION_INPUT, file.trim()));
        }
        if let Some(name) = self.system_name.as_deref().filter(|s| !s.is_empty()) {
            inputs.push(PipelineInput::new(SYSTEM_NAME_INPUT, name));
        }
        if let Some(objective) = self.objective.as_deref().filter(|s| !s.is_empty()) {
            inputs.push(PipelineInput::new(OBJECTIVE_INPUT, objective));
        }
        if !self.requirement.is_empty() {
            inputs.push(PipelineInput::new(REQUIREMENT_INPUT, self.requirement.clone()));
        }
        inputs
    }
}

// == Run Types ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub run_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunState {
    Running,
    Done,
    Failed,
    /// Any other state the API reports, treated as still pending
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutputs {
    #[serde(default)]
    pub output: String,
}

/// Status of a run as reported by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: String,
    pub state: RunState,
    #[serde(default)]
    pub outputs: Option<RunOutputs>,
}

impl PipelineRun {
    pub fn output(&self) -> Option<&str> {
        self.outputs.as_ref().map(|o| o.output.as_str())
    }
}

// == Uploads ==
/// A file the user picked for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Serialize)]
struct EncodedFile {
    file_name: String,
    file_content: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    uploaded_files: Vec<String>,
}

/// Checks that every file is a PDF and base64-encodes it.
fn encode_uploads(files: &[UploadFile]) -> Result<Vec<EncodedFile>> {
    if files.is_empty() {
        return Err(PipelineError::InvalidInput(
            "Please upload at least one PDF file".to_string(),
        ));
    }
    if let Some(bad) = files.iter().find(|f| !f.content_type.contains("pdf")) {
        return Err(PipelineError::InvalidInput(format!(
            "Only PDF files are accepted. Invalid file: {}",
            bad.file_name
        )));
    }
    Ok(files
        .iter()
        .map(|file| EncodedFile {
            file_name: file.file_name.clone(),
            file_content: STANDARD.encode(&file.bytes),
        })
        .collect())
}

// == Pipeline API Trait ==
/// The two calls the poller needs.
#[async_trait]
pub trait PipelineApi: Send + Sync + 'static {
    async fn start_pipeline(&self, inputs: Vec<PipelineInput>) -> Result<RunHandle>;

    async fn get_pipeline_run(&self, run_id: &str) -> Result<PipelineRun>;
}

// == HTTP Client ==
pub struct HttpPipelineClient {
    client: Client,
    settings: PipelineSettings,
}

impl HttpPipelineClient {
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Uploads regulation PDFs and returns the names the pipeline stored them under.
    pub async fn upload_files(&self, files: &[UploadFile]) -> Result<Vec<String>> {
        let encoded = encode_uploads(files)?;
        self.ensure_configured()?;
        info!("Uploading {} file(s) to the pipeline", encoded.len());

        let response = self
            .client
            .post(self.url("upload_files"))
            .bearer_auth(&self.settings.api_key)
            .json(&json!({ "user_id": self.settings.user_id, "files": encoded }))
            .send()
            .await
            .map_err(|e| PipelineError::Network(e.to_string()))?;

        let result: UploadResponse = read_json(response).await?;
        Ok(result.uploaded_files)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url, path)
    }

    fn ensure_configured(&self) -> Result<()> {
        if self.settings.is_configured() {
            Ok(())
        } else {
            Err(PipelineError::NotConfigured(
                "PIPELINE_API_KEY, PIPELINE_USER_ID and PIPELINE_SAVED_ITEM_ID must be set"
                    .to_string(),
            ))
        }
    }
}

#[async_trait]
impl PipelineApi for HttpPipelineClient {
    async fn start_pipeline(&self, inputs: Vec<PipelineInput>) -> Result<RunHandle> {
        self.ensure_configured()?;
        if inputs.is_empty() {
            return Err(PipelineError::InvalidInput("No pipeline inputs".to_string()));
        }
        debug!("Starting pipeline with {} input(s)", inputs.len());

        let response = self
            .client
            .post(self.url("start_pipeline"))
            .bearer_auth(&self.settings.api_key)
            .json(&json!({
                "user_id": self.settings.user_id,
                "saved_item_id": self.settings.saved_item_id,
                "pipeline_inputs": inputs,
            }))
            .send()
            .await
            .map_err(|e| PipelineError::Network(e.to_string()))?;

        read_json(response).await
    }

    async fn get_pipeline_run(&self, run_id: &str) -> Result<PipelineRun> {
        self.ensure_configured()?;
        let response = self
            .client
            .get(self.url("get_pl_run"))
            .bearer_auth(&self.settings.api_key)
            .query(&[("run_id", run_id), ("user_id", self.settings.user_id.as_str())])
            .send()
            .await
            .map_err(|e| PipelineError::Network(e.to_string()))?;

        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown".to_string());
        return Err(PipelineError::Api {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|e| PipelineError::Parse(e.to_string()))
}
