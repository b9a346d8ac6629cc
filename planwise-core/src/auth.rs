//! Credential store
//!
//! Owns the authenticated session and is the only code allowed to read or
//! write the stored token pair. It talks to the auth endpoints through the
//! bare [`HttpTransport`]; everything else goes through the gateway, which
//! calls back into [`CredentialStore::refresh_after`] on a 401.
//!
//! ## Session lifecycle
//!
//! ```text
//! Unauthenticated --login/register ok--> Authenticated
//! Authenticated   --logout-------------> Unauthenticated
//! Authenticated   --refresh failure----> Unauthenticated
//! ```
//!
//! `is_initialized` latches once the startup check has resolved, whatever
//! its outcome.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::{ApiRequest, Envelope, HttpTransport};
use crate::error::{Error, Result, StoreError};
use crate::storage::{SecretStore, TokenPair};
use crate::types::User;

/// Email/password pair for `POST /auth/login`
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() {
            return Err(Error::validation("email is required"));
        }
        if !self.email.contains('@') {
            return Err(Error::validation("email address is not valid"));
        }
        if self.password.is_empty() {
            return Err(Error::validation("password is required"));
        }
        Ok(())
    }
}

/// Sign-up payload for `POST /auth/signup`
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Registration {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name is required"));
        }
        Credentials::new(self.email.clone(), self.password.clone()).validate()
    }
}

/// Snapshot of the session as the UI sees it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Session {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_initialized: bool,
    pub is_loading: bool,
    pub error: Option<StoreError>,
}

impl Session {
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthPayload {
    #[serde(default)]
    user: Option<User>,
    #[serde(alias = "accessToken")]
    token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshPayload {
    #[serde(alias = "accessToken")]
    token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Owner of the session and its tokens
pub struct CredentialStore {
    transport: HttpTransport,
    secrets: Arc<dyn SecretStore>,
    state: Mutex<Session>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl CredentialStore {
    pub fn new(transport: HttpTransport, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            transport,
            secrets,
            state: Mutex::new(Session::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, Session> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current session snapshot
    pub fn session(&self) -> Session {
        self.state().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated
    }

    pub fn user(&self) -> Option<User> {
        self.state().user.clone()
    }

    pub fn error(&self) -> Option<StoreError> {
        self.state().error.clone()
    }

    pub fn clear_error(&self) {
        self.state().error = None;
    }

    /// Replace the cached user (after a profile update)
    pub fn set_user(&self, user: User) {
        self.state().user = Some(user);
    }

    /// Stored access token, or `None` when absent or unreadable
    pub fn get_token(&self) -> Option<String> {
        self.read_tokens().map(|t| t.token)
    }

    /// Stored refresh token, or `None` when absent or unreadable
    pub fn get_refresh_token(&self) -> Option<String> {
        self.read_tokens().map(|t| t.refresh_token)
    }

    fn read_tokens(&self) -> Option<TokenPair> {
        match self.secrets.get() {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored credentials");
                None
            }
        }
    }

    fn fail(&self, notice: &str, error: Error) -> Error {
        let mut state = self.state();
        state.is_loading = false;
        state.error = Some(StoreError::new(notice, &error));
        error
    }

    /// Sign in with email and password
    pub async fn login(&self, credentials: &Credentials) -> Result<()> {
        if let Err(e) = credentials.validate() {
            return Err(self.fail("Failed to sign in", e));
        }
        let request = ApiRequest::post("/auth/login").json(credentials)?;
        self.authenticate(request, "Failed to sign in").await
    }

    /// Create an account and sign in
    pub async fn register(&self, registration: &Registration) -> Result<()> {
        if let Err(e) = registration.validate() {
            return Err(self.fail("Failed to create account", e));
        }
        let request = ApiRequest::post("/auth/signup").json(registration)?;
        self.authenticate(request, "Failed to create account").await
    }

    async fn authenticate(&self, request: ApiRequest, notice: &str) -> Result<()> {
        {
            let mut state = self.state();
            state.is_loading = true;
            state.error = None;
        }

        let payload = match self
            .transport
            .execute::<AuthPayload>(&request, None)
            .await
            .and_then(Envelope::into_data)
        {
            Ok(payload) => payload,
            Err(e) => {
                tracing::info!(request = %request.describe(), error = %e, "Authentication failed");
                return Err(self.fail(notice, e));
            }
        };

        let tokens = TokenPair::new(payload.token, payload.refresh_token);
        if let Err(e) = self.secrets.set(&tokens) {
            tracing::error!(error = %e, "Failed to persist credentials");
            return Err(self.fail(notice, e));
        }

        let mut state = self.state();
        state.user = payload.user;
        state.is_authenticated = true;
        state.is_loading = false;
        state.error = None;
        tracing::info!(user_id = ?state.user_id(), "Signed in");
        Ok(())
    }

    /// Sign out. Stored tokens are cleared even if the remote call fails,
    /// and this never returns an error.
    pub async fn logout(&self) {
        if let Some(token) = self.get_token() {
            let request = ApiRequest::post("/auth/logout");
            if let Err(e) = self
                .transport
                .execute::<serde_json::Value>(&request, Some(&token))
                .await
            {
                tracing::warn!(error = %e, "Remote logout failed; clearing local session anyway");
            }
        }

        if let Err(e) = self.secrets.clear() {
            tracing::error!(error = %e, "Failed to clear stored credentials");
        }

        let mut state = self.state();
        state.user = None;
        state.is_authenticated = false;
        state.is_loading = false;
        state.error = None;
        tracing::info!("Signed out");
    }

    /// Exchange the stored refresh token for a new token pair.
    ///
    /// A failed exchange logs the user out and returns
    /// [`Error::SessionExpired`]. With no refresh token stored this fails
    /// with [`Error::Unauthenticated`].
    pub async fn refresh_auth_token(&self) -> Result<String> {
        self.refresh_after(None).await
    }

    /// Refresh on behalf of a request that was rejected with `stale_token`.
    ///
    /// Refreshes are serialized; if another caller already replaced
    /// `stale_token` while this one waited, the current token is returned
    /// without another exchange.
    pub async fn refresh_after(&self, stale_token: Option<&str>) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;

        let Some(current) = self.read_tokens() else {
            // A concurrent refresh failed and already ended the session
            if stale_token.is_some() {
                return Err(Error::SessionExpired("session ended by a failed refresh".into()));
            }
            return Err(Error::Unauthenticated);
        };

        if let Some(stale) = stale_token {
            if current.token != stale {
                tracing::debug!("Token already refreshed by a concurrent request");
                return Ok(current.token);
            }
        }

        let request = ApiRequest::post("/auth/refresh")
            .json(&json!({ "refreshToken": current.refresh_token }))?;

        let result = self
            .transport
            .execute::<RefreshPayload>(&request, None)
            .await
            .and_then(Envelope::into_data);

        match result {
            Ok(payload) => {
                let tokens = TokenPair::new(
                    payload.token,
                    payload.refresh_token.unwrap_or(current.refresh_token),
                );
                if let Err(e) = self.secrets.set(&tokens) {
                    tracing::error!(error = %e, "Failed to persist refreshed credentials");
                    self.logout().await;
                    return Err(Error::SessionExpired(e.to_string()));
                }
                tracing::info!("Access token refreshed");
                Ok(tokens.token)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed; ending session");
                self.logout().await;
                Err(Error::SessionExpired(e.to_string()))
            }
        }
    }

    /// Resolve the startup session from stored credentials.
    ///
    /// Validates a stored token against `GET /me`; an invalid token is
    /// cleared. Sets `is_initialized` once and is a no-op afterwards.
    pub async fn initialize_auth(&self) -> Session {
        if self.state().is_initialized {
            return self.session();
        }

        if let Some(token) = self.get_token() {
            self.state().is_loading = true;
            let request = ApiRequest::get("/me");
            match self
                .transport
                .execute::<User>(&request, Some(&token))
                .await
                .and_then(Envelope::into_data)
            {
                Ok(user) => {
                    let mut state = self.state();
                    tracing::info!(user_id = %user.id, "Restored session");
                    state.user = Some(user);
                    state.is_authenticated = true;
                }
                Err(e) => {
                    tracing::info!(error = %e, "Stored session is no longer valid");
                    if let Err(e) = self.secrets.clear() {
                        tracing::error!(error = %e, "Failed to clear stored credentials");
                    }
                    let mut state = self.state();
                    state.user = None;
                    state.is_authenticated = false;
                }
            }
        }

        let mut state = self.state();
        state.is_loading = false;
        state.is_initialized = true;
        state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::error::ErrorKind;
    use crate::storage::MemorySecretStore;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user_json() -> serde_json::Value {
        json!({ "id": "u1", "email": "ada@example.com", "name": "Ada" })
    }

    fn store(server: &MockServer, secrets: Arc<MemorySecretStore>) -> CredentialStore {
        let transport = HttpTransport::new(&ApiConfig::with_base_url(server.uri())).unwrap();
        CredentialStore::new(transport, secrets)
    }

    #[tokio::test]
    async fn test_login_success_persists_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({"email": "ada@example.com", "password": "hunter22"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "user": user_json(), "token": "acc-1", "refreshToken": "ref-1" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let secrets = Arc::new(MemorySecretStore::new());
        let creds = store(&server, secrets.clone());

        creds
            .login(&Credentials::new("ada@example.com", "hunter22"))
            .await
            .unwrap();

        let session = creds.session();
        assert!(session.is_authenticated);
        assert_eq!(session.user_id(), Some("u1"));
        assert!(session.error.is_none());
        assert_eq!(secrets.get().unwrap(), Some(TokenPair::new("acc-1", "ref-1")));
        assert_eq!(creds.get_token().as_deref(), Some("acc-1"));
        assert_eq!(creds.get_refresh_token().as_deref(), Some("ref-1"));
    }

    #[tokio::test]
    async fn test_login_wrong_credentials_leaves_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "success": false,
                "error": "Invalid credentials"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let secrets = Arc::new(MemorySecretStore::new());
        let creds = store(&server, secrets.clone());

        let err = creds
            .login(&Credentials::new("ada@example.com", "wrong"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);

        let session = creds.session();
        assert!(!session.is_authenticated);
        let slot = session.error.expect("error slot should be set");
        assert_eq!(slot.notice, "Failed to sign in");
        assert!(slot.message.contains("Invalid credentials"));
        assert!(secrets.get().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_validation_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let creds = store(&server, Arc::new(MemorySecretStore::new()));
        let err = creds.login(&Credentials::new("", "pw")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(creds.error().unwrap().kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_register_uses_signup_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/signup"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "success": true,
                "data": { "user": user_json(), "accessToken": "acc-1", "refreshToken": "ref-1" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let creds = store(&server, Arc::new(MemorySecretStore::new()));
        creds
            .register(&Registration {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                password: "hunter22".to_string(),
            })
            .await
            .unwrap();
        assert!(creds.is_authenticated());
        assert_eq!(creds.get_token().as_deref(), Some("acc-1"));
    }

    #[tokio::test]
    async fn test_logout_is_idempotent_and_survives_remote_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let secrets = Arc::new(MemorySecretStore::with_tokens(TokenPair::new("acc", "ref")));
        let creds = store(&server, secrets.clone());
        creds.set_user(serde_json::from_value(user_json()).unwrap());

        creds.logout().await;
        creds.logout().await;

        let session = creds.session();
        assert!(!session.is_authenticated);
        assert!(session.user.is_none());
        assert!(secrets.get().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_without_token_is_unauthenticated() {
        let server = MockServer::start().await;
        let creds = store(&server, Arc::new(MemorySecretStore::new()));
        assert!(matches!(
            creds.refresh_auth_token().await,
            Err(Error::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_refresh_success_rotates_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(body_json(json!({"refreshToken": "ref-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "token": "acc-2", "refreshToken": "ref-2" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let secrets = Arc::new(MemorySecretStore::with_tokens(TokenPair::new("acc-1", "ref-1")));
        let creds = store(&server, secrets.clone());

        assert_eq!(creds.refresh_auth_token().await.unwrap(), "acc-2");
        assert_eq!(secrets.get().unwrap(), Some(TokenPair::new("acc-2", "ref-2")));
    }

    #[tokio::test]
    async fn test_refresh_failure_forces_logout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let secrets = Arc::new(MemorySecretStore::with_tokens(TokenPair::new("acc-1", "ref-1")));
        let creds = store(&server, secrets.clone());
        creds.state().is_authenticated = true;

        let err = creds.refresh_auth_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionExpired);
        assert!(!creds.is_authenticated());
        assert!(secrets.get().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_refresh_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let secrets = Arc::new(MemorySecretStore::with_tokens(TokenPair::new("acc-2", "ref-2")));
        let creds = store(&server, secrets);
        assert_eq!(creds.refresh_after(Some("acc-1")).await.unwrap(), "acc-2");
    }

    #[tokio::test]
    async fn test_initialize_without_token() {
        let server = MockServer::start().await;
        let creds = store(&server, Arc::new(MemorySecretStore::new()));

        let session = creds.initialize_auth().await;
        assert!(session.is_initialized);
        assert!(!session.is_authenticated);
    }

    #[tokio::test]
    async fn test_initialize_with_valid_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", "Bearer acc-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": user_json()
            })))
            .expect(1)
            .mount(&server)
            .await;

        let creds = store(
            &server,
            Arc::new(MemorySecretStore::with_tokens(TokenPair::new("acc-1", "ref-1"))),
        );

        let session = creds.initialize_auth().await;
        assert!(session.is_initialized);
        assert!(session.is_authenticated);
        assert_eq!(session.user.unwrap().email, "ada@example.com");

        // Latched: a second call does not hit /me again
        let again = creds.initialize_auth().await;
        assert!(again.is_initialized);
    }

    #[tokio::test]
    async fn test_initialize_with_invalid_token_clears_it() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let secrets = Arc::new(MemorySecretStore::with_tokens(TokenPair::new("bad", "ref")));
        let creds = store(&server, secrets.clone());

        let session = creds.initialize_auth().await;
        assert!(session.is_initialized);
        assert!(!session.is_authenticated);
        assert!(secrets.get().unwrap().is_none());
    }
}
