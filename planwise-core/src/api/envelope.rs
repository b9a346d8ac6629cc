//! Uniform response envelope

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Pagination block attached to list responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

/// `{ success, data, error?, message?, pagination? }`
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

fn default_success() -> bool {
    true
}

impl<T> Envelope<T> {
    /// Human-readable failure text carried by the envelope, if any
    pub fn failure_message(&self) -> Option<&str> {
        self.error.as_deref().or(self.message.as_deref())
    }

    /// Take the payload, failing if the server sent none
    pub fn into_data(self) -> Result<T> {
        self.data.ok_or_else(|| Error::Remote {
            status: None,
            message: "response envelope has no data".to_string(),
        })
    }
}
