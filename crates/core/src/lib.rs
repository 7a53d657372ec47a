//! Clipmark Core Library
//!
//! Parses Stream Time Marker exports, drives clip extraction jobs on a
//! remote service and keeps the user's auth session.

pub mod api;
pub mod config;
pub mod error;
pub mod extraction;
pub mod format;
pub mod markers;
pub mod paths;
pub mod service;
pub mod session;
pub mod store;
pub mod types;

// Re-export commonly used items at crate root
pub use api::HttpApi;
pub use config::ClientConfig;
pub use error::{ClipmarkError, Result, ValidationError};
pub use extraction::{ExtractionForm, ExtractionUpdate, Extractor, PollPolicy, PreparedExtraction};
pub use format::{format_markers, format_results_readable, format_timestamp};
pub use markers::{MarkerScan, RejectReason, TimestampMarker, extract_markers, scan_markers};
pub use paths::{get_config_path, get_download_dir, get_session_dir};
pub use service::{AuthService, ClipService};
pub use session::{Auth, Session, SessionState, validate_registration};
pub use store::{FileStore, MemoryStore, SessionStore};
pub use types::{ClipResult, ExtractionResult, JobProgress, JobStatus, User};
