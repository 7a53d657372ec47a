use std::{path::PathBuf, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipmarkError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("An extraction is already in progress")]
    AlreadyRunning,

    #[error("Server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Extraction failed: {0}")]
    JobFailed(String),

    #[error("Job {task_id} completed without results")]
    MissingResults { task_id: String },

    #[error("Extraction timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },

    #[error("Invalid config file {path}: {source}")]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),
}

/// Input problems caught before anything goes over the network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Video URL is required")]
    MissingVideoUrl,

    #[error("Timestamp text is required")]
    MissingTimestamps,

    #[error("No \"Stream Time Marker\" timestamps found")]
    NoMarkersFound,

    #[error("Malformed clock {clock:?} on line {line}")]
    MalformedClock { line: usize, clock: String },

    #[error("Clip duration must be between {min} and {max} seconds, got {value}")]
    ClipDurationOutOfRange { value: u32, min: u32, max: u32 },

    #[error("All fields are required")]
    MissingField,

    #[error("Username must be at least 3 characters")]
    UsernameTooShort,

    #[error("Password must be at least 8 characters")]
    PasswordTooShort,

    #[error("Password must contain at least one letter")]
    PasswordNeedsLetter,

    #[error("Password must contain at least one number")]
    PasswordNeedsDigit,

    #[error("Passwords do not match")]
    PasswordMismatch,
}

pub type Result<T> = std::result::Result<T, ClipmarkError>;
