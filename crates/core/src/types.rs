use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /api/extract-clips`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub video_url: String,
    pub timestamps_input: String,
    pub clip_duration: u32,
}

/// The service either queues a job or answers with the finished result.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SubmitResponse {
    Queued { task_id: String },
    Immediate(ExtractionResult),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Starting,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Body of `GET /api/progress/{task_id}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobProgress {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub results: Option<ExtractionResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ExtractionResult {
    /// Absent on the immediate path; `false` when the job finished but
    /// produced nothing usable.
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub successful_clips: u32,
    #[serde(default)]
    pub total_clips: Option<u32>,
    #[serde(default)]
    pub total_size_mb: f64,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub zip_filename: Option<String>,
    #[serde(default)]
    pub clips: Vec<ClipResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ClipResult {
    pub success: bool,
    #[serde(default)]
    pub filename: Option<String>,
    /// Marker position in seconds.
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub size_mb: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Session user as the auth service returns it. Unknown fields are kept so
/// the persisted copy round-trips.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.email)
    }
}

/// Reply shape shared by register, login and google-login.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Reply of verify-token, logout and request-password-reset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
