//! Fixtures shared by the store tests

use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::{MockServer, ResponseTemplate};

use crate::api::{Gateway, HttpTransport};
use crate::auth::CredentialStore;
use crate::config::ApiConfig;
use crate::storage::{MemorySecretStore, TokenPair};
use crate::types::Task;

/// Gateway against `server`, already signed in as `acc-1`/`ref-1`
pub(crate) fn gateway(server: &MockServer) -> Arc<Gateway> {
    let transport = HttpTransport::new(&ApiConfig::with_base_url(server.uri())).unwrap();
    let secrets = Arc::new(MemorySecretStore::with_tokens(TokenPair::new("acc-1", "ref-1")));
    let credentials = Arc::new(CredentialStore::new(transport.clone(), secrets));
    Arc::new(Gateway::new(transport, credentials))
}

/// Signed-in gateway whose base URL refuses connections
pub(crate) fn unreachable_gateway() -> Arc<Gateway> {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .unwrap()
        .port();
    let base_url = format!("http://127.0.0.1:{}", port);
    let transport = HttpTransport::new(&ApiConfig::with_base_url(base_url)).unwrap();
    let secrets = Arc::new(MemorySecretStore::with_tokens(TokenPair::new("acc-1", "ref-1")));
    let credentials = Arc::new(CredentialStore::new(transport.clone(), secrets));
    Arc::new(Gateway::new(transport, credentials))
}

pub(crate) fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": data }))
}

pub(crate) fn task_json(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "status": "TODO",
        "priority": "MEDIUM",
        "createdBy": "u1",
        "order": 0,
        "createdAt": "2026-10-01T09:00:00Z",
        "updatedAt": "2026-10-01T09:00:00Z"
    })
}

pub(crate) fn task(id: &str, title: &str) -> Task {
    serde_json::from_value(task_json(id, title)).unwrap()
}
