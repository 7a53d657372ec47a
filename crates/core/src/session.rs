//! Authentication session lifecycle.
//!
//! There is no global session. [`Auth`] owns the service and the durable
//! store; each operation returns a fresh [`SessionState`] snapshot that the
//! caller passes on to whatever needs it. Durable storage is always written
//! before the new snapshot is handed out.

use crate::{
    error::{ClipmarkError, Result, ValidationError},
    service::AuthService,
    store::SessionStore,
    types::{AuthReply, User},
};

pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const AUTH_USER_KEY: &str = "auth_user";

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    /// Startup verification has not finished yet.
    #[default]
    Loading,
    SignedOut,
    SignedIn(Session),
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::SignedIn(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading)
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::SignedIn(session) => Some(session),
            _ => None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.session().map(|s| s.token.as_str())
    }

    pub fn user(&self) -> Option<&User> {
        self.session().map(|s| &s.user)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Local checks run before a registration is sent.
pub fn validate_registration(
    email: &str,
    username: &str,
    password: &str,
    confirm_password: &str,
) -> std::result::Result<(), ValidationError> {
    if email.trim().is_empty()
        || username.trim().is_empty()
        || password.is_empty()
        || confirm_password.is_empty()
    {
        return Err(ValidationError::MissingField);
    }
    if password != confirm_password {
        return Err(ValidationError::PasswordMismatch);
    }
    if password.chars().count() < 8 {
        return Err(ValidationError::PasswordTooShort);
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::PasswordNeedsLetter);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::PasswordNeedsDigit);
    }
    if username.trim().chars().count() < 3 {
        return Err(ValidationError::UsernameTooShort);
    }
    Ok(())
}

pub struct Auth<A, S> {
    service: A,
    store: S,
}

impl<A: AuthService, S: SessionStore> Auth<A, S> {
    pub fn new(service: A, store: S) -> Self {
        Self { service, store }
    }

    pub fn service(&self) -> &A {
        &self.service
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Restore and verify the persisted session. Anything short of a
    /// successful verification ends signed out with storage cleared.
    pub async fn init(&self) -> SessionState {
        let Some(session) = self.load_persisted().await else {
            self.clear_storage().await;
            return SessionState::SignedOut;
        };

        match self.service.verify_token(&session.token).await {
            Ok(reply) if reply.success => SessionState::SignedIn(session),
            Ok(reply) => {
                tracing::info!(
                    error = reply.error.as_deref().unwrap_or("rejected"),
                    "stored token no longer valid"
                );
                self.clear_storage().await;
                SessionState::SignedOut
            }
            Err(e) => {
                tracing::warn!(error = %e, "token verification failed");
                self.clear_storage().await;
                SessionState::SignedOut
            }
        }
    }

    async fn load_persisted(&self) -> Option<Session> {
        let token = self.store.get(AUTH_TOKEN_KEY).await;
        let user = self.store.get(AUTH_USER_KEY).await;
        match (token, user) {
            (Ok(Some(token)), Ok(Some(user))) => match serde_json::from_str::<User>(&user) {
                Ok(user) => Some(Session { user, token }),
                Err(e) => {
                    tracing::warn!(error = %e, "stored user is unreadable");
                    None
                }
            },
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "failed to read stored session");
                None
            }
            _ => None,
        }
    }

    async fn clear_storage(&self) {
        for key in [AUTH_TOKEN_KEY, AUTH_USER_KEY] {
            if let Err(e) = self.store.remove(key).await {
                tracing::warn!(key, error = %e, "failed to clear stored session entry");
            }
        }
    }

    /// Writes the token, then the user. A failed user write puts the
    /// previous token back so an earlier session stays intact.
    async fn persist(&self, session: &Session) -> Result<()> {
        let user = serde_json::to_string(&session.user)?;
        let previous_token = self.store.get(AUTH_TOKEN_KEY).await?;
        self.store.set(AUTH_TOKEN_KEY, &session.token).await?;

        if let Err(e) = self.store.set(AUTH_USER_KEY, &user).await {
            let rollback = match &previous_token {
                Some(token) => self.store.set(AUTH_TOKEN_KEY, token).await,
                None => self.store.remove(AUTH_TOKEN_KEY).await,
            };
            if let Err(rollback) = rollback {
                tracing::warn!(error = %rollback, "failed to restore previous session token");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn establish(&self, reply: AuthReply) -> Result<SessionState> {
        if !reply.success {
            return Err(ClipmarkError::Rejected(
                reply
                    .error
                    .unwrap_or_else(|| "authentication failed".to_string()),
            ));
        }
        let (Some(user), Some(token)) = (reply.user, reply.access_token) else {
            return Err(ClipmarkError::Rejected(
                "response is missing the user or the access token".to_string(),
            ));
        };

        let session = Session { user, token };
        self.persist(&session).await?;
        Ok(SessionState::SignedIn(session))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<SessionState> {
        let reply = self
            .service
            .login(&normalize_email(email), password)
            .await?;
        self.establish(reply).await
    }

    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<SessionState> {
        let reply = self
            .service
            .register(&normalize_email(email), username.trim(), password)
            .await?;
        self.establish(reply).await
    }

    pub async fn google_login(&self, google_token: &str) -> Result<SessionState> {
        let reply = self.service.google_login(google_token).await?;
        self.establish(reply).await
    }

    /// Always ends signed out. The server is told when possible; a failed
    /// notification never keeps local state around.
    pub async fn logout(&self, current: &SessionState) -> SessionState {
        if let Some(token) = current.token() {
            self.notify_logout(token).await;
        }
        self.clear_storage().await;
        SessionState::SignedOut
    }

    /// Logout for a caller that holds no verified snapshot: whatever token is
    /// stored is sent to the server as is, without verifying it first.
    pub async fn logout_stored(&self) -> SessionState {
        match self.store.get(AUTH_TOKEN_KEY).await {
            Ok(Some(token)) => self.notify_logout(&token).await,
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "failed to read stored token"),
        }
        self.clear_storage().await;
        SessionState::SignedOut
    }

    async fn notify_logout(&self, token: &str) {
        match self.service.logout(token).await {
            Ok(reply) if !reply.success => {
                tracing::warn!(error = ?reply.error, "server refused logout")
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "logout notification failed"),
        }
    }

    /// Returns the server's confirmation message.
    pub async fn request_password_reset(&self, email: &str) -> Result<String> {
        let reply = self
            .service
            .request_password_reset(&normalize_email(email))
            .await?;
        if reply.success {
            Ok(reply
                .message
                .unwrap_or_else(|| "Password reset requested".to_string()))
        } else {
            Err(ClipmarkError::Rejected(
                reply
                    .error
                    .or(reply.message)
                    .unwrap_or_else(|| "password reset request failed".to_string()),
            ))
        }
    }
}
