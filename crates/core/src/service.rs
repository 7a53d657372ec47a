//! Seams between the client logic and the remote services.
//!
//! [`crate::api::HttpApi`] is the real implementation; tests swap in fakes.

use crate::{
    error::Result,
    types::{AuthReply, ExtractionRequest, JobProgress, StatusReply, SubmitResponse},
};

pub trait ClipService {
    async fn submit(&self, request: &ExtractionRequest) -> Result<SubmitResponse>;
    async fn progress(&self, task_id: &str) -> Result<JobProgress>;
}

pub trait AuthService {
    async fn register(&self, email: &str, username: &str, password: &str) -> Result<AuthReply>;
    async fn login(&self, email: &str, password: &str) -> Result<AuthReply>;
    async fn google_login(&self, google_token: &str) -> Result<AuthReply>;
    async fn verify_token(&self, token: &str) -> Result<StatusReply>;
    async fn logout(&self, token: &str) -> Result<StatusReply>;
    async fn request_password_reset(&self, email: &str) -> Result<StatusReply>;
}
