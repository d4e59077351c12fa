// Governance registry client
//
// Thin GraphQL transport over the registry's single POST endpoint. Every
// request carries the registry API key; authenticated operations add a
// bearer token, and the login exchange adds its one-time nonce header.

pub mod auth;
pub mod publish;

use reqwest::StatusCode;
use serde_json::Value;

use crate::error::PipelineError;

/// Default registry GraphQL endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.tally.xyz/query";

/// Client for the registry's GraphQL endpoint
pub struct RegistryClient {
    endpoint: String,
    api_key: String,
    http: reqwest::Client,
}

/// One GraphQL response, kept alongside its HTTP status
///
/// The registry signals "not found" through HTTP 422 and most other
/// failures through in-band `errors`, so callers need both.
#[derive(Debug)]
pub struct RegistryResponse {
    pub status: StatusCode,
    pub data: Option<Value>,
    pub errors: Option<Vec<Value>>,
}

impl RegistryResponse {
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().map(|e| !e.is_empty()).unwrap_or(false)
    }

    /// Serialized error payload, for substring classification and logs
    pub fn errors_text(&self) -> String {
        self.errors
            .as_ref()
            .and_then(|e| serde_json::to_string(e).ok())
            .unwrap_or_default()
    }

    /// Benign not-found signal used by the lookup queries
    pub fn not_found(&self) -> bool {
        self.status == StatusCode::UNPROCESSABLE_ENTITY
    }
}

impl RegistryClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Execute one GraphQL operation against the registry
    pub async fn execute(
        &self,
        query: &str,
        variables: Value,
        bearer: Option<&str>,
        nonce: Option<&str>,
    ) -> Result<RegistryResponse, PipelineError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .json(&serde_json::json!({ "query": query, "variables": variables }));
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(nonce) = nonce {
            request = request.header("nonce", nonce);
        }

        let response = request.send().await?;
        let status = response.status();
        // Error bodies are not always JSON; status-based handling still works
        let body: Value = response.json().await.unwrap_or(Value::Null);
        Ok(RegistryResponse {
            status,
            data: body.get("data").filter(|d| !d.is_null()).cloned(),
            errors: body.get("errors").and_then(Value::as_array).cloned(),
        })
    }
}
