//! Host Web API contract
//!
//! The hosting runtime hands every control an object implementing [`WebApi`].

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use pcf_types::{BatchItem, ExecuteRequest};

/// Response to a single request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebApiResponse {
    pub ok: bool,
    pub status: u16,
    #[serde(default)]
    pub body: Value,
}

impl WebApiResponse {
    pub fn success(status: u16, body: Value) -> Self {
        Self {
            ok: true,
            status,
            body,
        }
    }

    pub fn failure(status: u16, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            status,
            body: json!({ "error": { "message": message.into() } }),
        }
    }

    /// Error message of a failed response, in the OData error shape
    pub fn error_message(&self) -> Option<&str> {
        if self.ok {
            return None;
        }
        self.body
            .pointer("/error/message")
            .and_then(Value::as_str)
    }
}

/// Records returned by a multi-record query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityCollection {
    pub entities: Vec<Value>,
    #[serde(rename = "nextLink", default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
}

#[async_trait]
pub trait WebApi: Send + Sync {
    /// Run a single request
    async fn execute(&self, request: &ExecuteRequest) -> Result<WebApiResponse>;

    /// Run a batch; one response per request, change-set members included,
    /// in submission order
    async fn execute_multiple(&self, items: &[BatchItem]) -> Result<Vec<WebApiResponse>>;

    /// Query `entity_name` records with an OData query string such as
    /// `?$select=fullname&$top=50`
    async fn retrieve_multiple_records(
        &self,
        entity_name: &str,
        query: &str,
    ) -> Result<EntityCollection>;
}
