//! Shared request pipeline with auth injection and refresh-and-retry.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::auth::CredentialStore;
use crate::error::{Error, Result};

use super::envelope::Envelope;
use super::request::ApiRequest;
use super::transport::HttpTransport;

/// Single point of outbound requests for all entity stores.
///
/// A request rejected with 401 triggers one token refresh through the
/// credential store and is then reissued exactly once. A refresh failure is
/// returned to the caller as-is (the credential store has already ended the
/// session by then).
pub struct Gateway {
    transport: HttpTransport,
    credentials: Arc<CredentialStore>,
}

impl Gateway {
    pub fn new(transport: HttpTransport, credentials: Arc<CredentialStore>) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Send a request and return the full envelope
    pub async fn send<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<Envelope<T>> {
        let token = self.credentials.get_token();

        match self.transport.execute(request, token.as_deref()).await {
            Err(Error::Auth(message)) => {
                tracing::info!(
                    request = %request.describe(),
                    "Access token rejected ({}), refreshing",
                    message
                );
                let fresh = self.credentials.refresh_after(token.as_deref()).await?;
                // Retried once; a second 401 is returned to the caller
                self.transport.execute(request, Some(&fresh)).await
            }
            other => other,
        }
    }

    /// Send a request and return its payload
    pub async fn fetch<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        self.send(request).await?.into_data()
    }

    /// Send a request whose payload is not needed
    pub async fn execute(&self, request: &ApiRequest) -> Result<()> {
        self.send::<serde_json::Value>(request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::ApiConfig;
    use crate::error::ErrorKind;
    use crate::storage::{MemorySecretStore, SecretStore, TokenPair};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer, secrets: Arc<MemorySecretStore>) -> Gateway {
        let transport = HttpTransport::new(&ApiConfig::with_base_url(server.uri())).unwrap();
        let credentials = Arc::new(CredentialStore::new(transport.clone(), secrets));
        Gateway::new(transport, credentials)
    }

    fn ok(data: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": data }))
    }

    async fn mount_refresh(server: &MockServer, response: ResponseTemplate, times: u64) {
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(response)
            .expect(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_attaches_current_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks"))
            .and(header("authorization", "Bearer acc-1"))
            .respond_with(ok(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let gw = gateway(
            &server,
            Arc::new(MemorySecretStore::with_tokens(TokenPair::new("acc-1", "ref-1"))),
        );
        let tasks: Vec<serde_json::Value> = gw.fetch(&ApiRequest::get("/tasks")).await.unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_sends_without_header_when_no_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ok(json!("up")))
            .mount(&server)
            .await;

        let gw = gateway(&server, Arc::new(MemorySecretStore::new()));
        gw.execute(&ApiRequest::get("/health")).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_refresh_then_retry_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks"))
            .and(header("authorization", "Bearer acc-1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tasks"))
            .and(header("authorization", "Bearer acc-2"))
            .respond_with(ok(json!([{"id": "t1"}])))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(
            &server,
            ok(json!({"token": "acc-2", "refreshToken": "ref-2"})),
            1,
        )
        .await;

        let secrets = Arc::new(MemorySecretStore::with_tokens(TokenPair::new("acc-1", "ref-1")));
        let gw = gateway(&server, secrets.clone());

        let tasks: Vec<serde_json::Value> = gw.fetch(&ApiRequest::get("/tasks")).await.unwrap();
        assert_eq!(tasks[0]["id"], "t1");
        assert_eq!(secrets.get().unwrap().unwrap().token, "acc-2");
    }

    #[tokio::test]
    async fn test_refresh_failure_surfaces_session_expired() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, ResponseTemplate::new(401), 1).await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let secrets = Arc::new(MemorySecretStore::with_tokens(TokenPair::new("acc-1", "ref-1")));
        let gw = gateway(&server, secrets.clone());

        let err = gw.execute(&ApiRequest::get("/tasks")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionExpired);
        assert!(secrets.get().unwrap().is_none());
        assert!(!gw.credentials().is_authenticated());
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_not_retried_again() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        mount_refresh(
            &server,
            ok(json!({"token": "acc-2", "refreshToken": "ref-2"})),
            1,
        )
        .await;

        let gw = gateway(
            &server,
            Arc::new(MemorySecretStore::with_tokens(TokenPair::new("acc-1", "ref-1"))),
        );
        let err = gw.execute(&ApiRequest::get("/tasks")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer acc-1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer acc-2"))
            .respond_with(ok(json!(true)))
            .expect(2)
            .mount(&server)
            .await;
        mount_refresh(
            &server,
            ok(json!({"token": "acc-2", "refreshToken": "ref-2"})),
            1,
        )
        .await;

        let gw = gateway(
            &server,
            Arc::new(MemorySecretStore::with_tokens(TokenPair::new("acc-1", "ref-1"))),
        );
        let (tasks, goals) = (ApiRequest::get("/tasks"), ApiRequest::get("/goals"));
        let (a, b) = tokio::join!(gw.execute(&tasks), gw.execute(&goals));
        assert!(a.is_ok());
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_failures_all_see_session_expired() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer acc-1"))
            .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(50)))
            .expect(2)
            .mount(&server)
            .await;
        mount_refresh(&server, ResponseTemplate::new(401), 1).await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .respond_with(ok(json!(null)))
            .mount(&server)
            .await;

        let secrets = Arc::new(MemorySecretStore::with_tokens(TokenPair::new("acc-1", "ref-1")));
        let gw = gateway(&server, secrets.clone());
        let (tasks, goals) = (ApiRequest::get("/tasks"), ApiRequest::get("/goals"));
        let (a, b) = tokio::join!(gw.execute(&tasks), gw.execute(&goals));

        assert_eq!(a.unwrap_err().kind(), ErrorKind::SessionExpired);
        assert_eq!(b.unwrap_err().kind(), ErrorKind::SessionExpired);
        assert!(secrets.get().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_errors_pass_through() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "success": false,
                "error": "title too long"
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, ResponseTemplate::new(200), 0).await;

        let gw = gateway(
            &server,
            Arc::new(MemorySecretStore::with_tokens(TokenPair::new("acc-1", "ref-1"))),
        );
        let err = gw.execute(&ApiRequest::put("/tasks/t1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert_eq!(err.status(), Some(422));
    }
}
