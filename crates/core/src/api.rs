use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::{fs, io::AsyncWriteExt};

use crate::{
    config::ClientConfig,
    error::{ClipmarkError, Result},
    paths::get_archive_path,
    service::{AuthService, ClipService},
    types::{AuthReply, ExtractionRequest, JobProgress, StatusReply, SubmitResponse},
};

/// reqwest client for both the clip service and the auth service.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    api_url: String,
    auth_url: String,
    request_timeout: Duration,
    bearer: Option<String>,
}

/// Join a server path onto a base URL; absolute URLs pass through.
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Best human readable message from an error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .unwrap_or_else(|| {
            let body = body.trim();
            if body.is_empty() {
                "request failed".to_string()
            } else {
                body.chars().take(200).collect()
            }
        })
}

/// Clip endpoints: anything but 2xx is an error.
fn decode_json<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T> {
    if !status.is_success() {
        return Err(ClipmarkError::Server {
            status: status.as_u16(),
            message: error_message(body),
        });
    }
    Ok(serde_json::from_str(body)?)
}

/// Auth endpoints answer 4xx with a `{success: false, error}` body that the
/// caller should see verbatim.
fn decode_reply<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T> {
    match serde_json::from_str(body) {
        Ok(reply) => Ok(reply),
        Err(e) if status.is_success() => Err(e.into()),
        Err(_) => Err(ClipmarkError::Server {
            status: status.as_u16(),
            message: error_message(body),
        }),
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    decode_json(status, &response.text().await?)
}

async fn read_reply<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    decode_reply(status, &response.text().await?)
}

impl HttpApi {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            auth_url: config.auth_url.clone(),
            request_timeout: config.request_timeout(),
            bearer: None,
        })
    }

    /// Attach the session token to every clip request made through this handle.
    pub fn with_bearer(mut self, token: Option<&str>) -> Self {
        self.bearer = token.map(str::to_string);
        self
    }

    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn auth_endpoint(&self, path: &str) -> String {
        join_url(&self.auth_url, &format!("/api/auth/{}", path))
    }

    async fn post_auth<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = self.auth_endpoint(path);
        tracing::debug!(%url, "auth request");
        let mut request = self.client.post(&url).timeout(self.request_timeout).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        read_reply(request.send().await?).await
    }

    /// Stream the archive behind `download_url` into `dir`. `on_chunk` gets
    /// the bytes written so far and the total size when the server sends one.
    pub async fn download_archive(
        &self,
        download_url: &str,
        zip_filename: Option<&str>,
        dir: &Path,
        mut on_chunk: impl FnMut(u64, Option<u64>),
    ) -> Result<PathBuf> {
        let url = join_url(&self.api_url, download_url);
        tracing::debug!(%url, "downloading archive");
        let response = self.authorize(self.client.get(&url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(ClipmarkError::Server {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        fs::create_dir_all(dir).await?;
        let path = get_archive_path(dir, zip_filename);
        if let Err(e) = write_body(response, &path, &mut on_chunk).await {
            let _ = fs::remove_file(&path).await;
            return Err(e);
        }
        Ok(path)
    }
}

async fn write_body(
    mut response: Response,
    path: &Path,
    on_chunk: &mut impl FnMut(u64, Option<u64>),
) -> Result<()> {
    let total = response.content_length();
    let mut file = fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        on_chunk(written, total);
    }
    file.flush().await?;
    Ok(())
}

impl ClipService for HttpApi {
    async fn submit(&self, request: &ExtractionRequest) -> Result<SubmitResponse> {
        let url = join_url(&self.api_url, "/api/extract-clips");
        tracing::debug!(%url, clip_duration = request.clip_duration, "submitting extraction");
        let response = self
            .authorize(self.client.post(&url))
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await?;
        read_json(response).await
    }

    async fn progress(&self, task_id: &str) -> Result<JobProgress> {
        let url = join_url(&self.api_url, &format!("/api/progress/{}", task_id));
        let response = self
            .authorize(self.client.get(&url))
            .timeout(self.request_timeout)
            .send()
            .await?;
        read_json(response).await
    }
}

impl AuthService for HttpApi {
    async fn register(&self, email: &str, username: &str, password: &str) -> Result<AuthReply> {
        self.post_auth(
            "register",
            None,
            &serde_json::json!({
                "email": email,
                "username": username,
                "password": password,
            }),
        )
        .await
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthReply> {
        self.post_auth(
            "login",
            None,
            &serde_json::json!({
                "email": email,
                "password": password,
            }),
        )
        .await
    }

    async fn google_login(&self, google_token: &str) -> Result<AuthReply> {
        self.post_auth(
            "google-login",
            None,
            &serde_json::json!({ "google_token": google_token }),
        )
        .await
    }

    async fn verify_token(&self, token: &str) -> Result<StatusReply> {
        let url = self.auth_endpoint("verify-token");
        tracing::debug!(%url, "auth request");
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .bearer_auth(token)
            .send()
            .await?;
        read_reply(response).await
    }

    async fn logout(&self, token: &str) -> Result<StatusReply> {
        self.post_auth("logout", Some(token), &serde_json::json!({}))
            .await
    }

    async fn request_password_reset(&self, email: &str) -> Result<StatusReply> {
        self.post_auth(
            "request-password-reset",
            None,
            &serde_json::json!({ "email": email }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://localhost:8000/", "/api/download/1"),
            "http://localhost:8000/api/download/1"
        );
        assert_eq!(
            join_url("http://localhost:8000", "api/progress/x"),
            "http://localhost:8000/api/progress/x"
        );
        assert_eq!(
            join_url("http://localhost:8000", "https://cdn.example.com/a.zip"),
            "https://cdn.example.com/a.zip"
        );
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"success":false,"error":"Task not found"}"#),
            "Task not found"
        );
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(error_message("  "), "request failed");
    }

    #[test]
    fn test_auth_error_body_reaches_caller() {
        let reply: AuthReply = decode_reply(
            StatusCode::UNAUTHORIZED,
            r#"{"success":false,"error":"Invalid credentials"}"#,
        )
        .unwrap();
        assert!(!reply.success);
        assert_eq!(reply.error.as_deref(), Some("Invalid credentials"));

        let err = decode_reply::<AuthReply>(StatusCode::BAD_GATEWAY, "Bad Gateway").unwrap_err();
        assert!(matches!(
            err,
            ClipmarkError::Server { status: 502, ref message } if message == "Bad Gateway"
        ));

        let err = decode_reply::<AuthReply>(StatusCode::OK, "{not json").unwrap_err();
        assert!(matches!(err, ClipmarkError::JsonError(_)));
    }

    #[test]
    fn test_clip_error_status_surfaces_body_error() {
        let err = decode_json::<SubmitResponse>(
            StatusCode::BAD_REQUEST,
            r#"{"success":false,"error":"Invalid video URL"}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ClipmarkError::Server { status: 400, ref message } if message == "Invalid video URL"
        ));

        let queued: SubmitResponse =
            decode_json(StatusCode::OK, r#"{"task_id":"abc"}"#).unwrap();
        assert!(matches!(queued, SubmitResponse::Queued { ref task_id } if task_id == "abc"));

        let err = decode_json::<JobProgress>(StatusCode::OK, "<html>").unwrap_err();
        assert!(matches!(err, ClipmarkError::JsonError(_)));
    }

    #[test]
    fn test_bearer_is_explicit() {
        let api = HttpApi::new(&ClientConfig::default()).unwrap();
        assert_eq!(api.bearer(), None);
        let api = api.with_bearer(Some("tok"));
        assert_eq!(api.bearer(), Some("tok"));
    }
}
