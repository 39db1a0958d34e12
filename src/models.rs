//! Request and response bodies exchanged with the UltraOCR api.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::{STATUS_DONE, STATUS_ERROR, STATUS_PROCESSING, STATUS_WAITING};

/// Processing state reported by the server. Anything unrecognised is kept verbatim
/// and treated as still running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    Waiting,
    Processing,
    Done,
    Error,
    Other(String),
}

impl JobState {
    /// `done` and `error` are the only states a wait stops on
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Error)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Waiting => STATUS_WAITING,
            JobState::Processing => STATUS_PROCESSING,
            JobState::Done => STATUS_DONE,
            JobState::Error => STATUS_ERROR,
            JobState::Other(s) => s,
        }
    }
}

impl From<String> for JobState {
    fn from(value: String) -> Self {
        match value.as_str() {
            STATUS_WAITING => JobState::Waiting,
            STATUS_PROCESSING => JobState::Processing,
            STATUS_DONE => JobState::Done,
            STATUS_ERROR => JobState::Error,
            _ => JobState::Other(value),
        }
    }
}

impl From<JobState> for String {
    fn from(value: JobState) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST {auth}/token`. The server wants PascalCase here and nowhere else.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest<'a> {
    #[serde(rename = "ClientID")]
    pub client_id: &'a str,
    #[serde(rename = "ClientSecret")]
    pub client_secret: &'a str,
    #[serde(rename = "ExpiresIn")]
    pub expires_in: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Pre-signed upload targets for a freshly created job or batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedUrl {
    pub id: String,
    pub status_url: String,
    pub exp: i64,
    /// role (`document`, `selfie`, `extra_document`) -> upload url
    pub urls: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedJob {
    pub id: String,
    pub status_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrResult {
    #[serde(rename = "Document", default, skip_serializing_if = "Option::is_none")]
    pub document: Option<serde_json::Value>,
    #[serde(rename = "Quantity", default)]
    pub quantity: u32,
    #[serde(rename = "Time", default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// Status and (once done) result of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_ksuid: String,
    pub created_at: String,
    pub service: String,
    pub status: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<OcrResult>,
    // present when the job is the root of a batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<Vec<BatchJob>>,
}

/// Per-job summary nested in a batch status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub job_ksuid: String,
    pub created_at: String,
    pub result_url: String,
    pub status: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatus {
    pub batch_ksuid: String,
    pub created_at: String,
    pub service: String,
    pub status: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<Vec<BatchJob>>,
}

/// One page of `GET /ocr/job/results`
#[derive(Debug, Clone, Deserialize)]
pub struct JobsPage {
    pub jobs: Vec<JobResult>,
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub job_id: String,
    pub client_id: String,
    pub company_id: String,
    #[serde(default)]
    pub validation_id: Option<String>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    pub service: String,
    pub status: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<OcrResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchInfo {
    pub batch_id: String,
    pub client_id: String,
    pub company_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_id: Option<String>,
    pub created_at: String,
    pub service: String,
    pub status: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_jobs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_processed: Option<u32>,
}

/// Where the server dropped the results of a whole batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResultStorage {
    pub url: String,
    pub exp: String,
}
