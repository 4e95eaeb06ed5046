//! HTTP transport to the analysis backend.
//!
//! The submission client talks to the backend only through [`Transport`], so
//! tests and alternative hosts can substitute their own implementation.
//! [`HttpTransport`] is the reqwest-based one used by the CLI.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{UploadMetadata, UploadReceipt};

/// Transport-level failures, with HTTP statuses kept distinct
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unprocessable request: {0}")]
    Unprocessable(String),

    #[error("Server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Unexpected response {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    Url(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Decode(err.to_string())
    }
}

/// Map a non-success HTTP status onto a transport error
pub fn error_for_status(status: StatusCode, body: String) -> TransportError {
    match status {
        StatusCode::UNAUTHORIZED => TransportError::Unauthorized,
        StatusCode::FORBIDDEN => TransportError::Forbidden(body),
        StatusCode::NOT_FOUND => TransportError::NotFound(body),
        StatusCode::UNPROCESSABLE_ENTITY => TransportError::Unprocessable(body),
        s if s.is_server_error() => TransportError::Server {
            status: s.as_u16(),
            body,
        },
        s => TransportError::Status {
            status: s.as_u16(),
            body,
        },
    }
}

/// Supplies the bearer credential attached to every request
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String, TransportError>;
}

/// Fixed token, e.g. from an environment variable
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String, TransportError> {
        if self.0.is_empty() {
            return Err(TransportError::Unauthorized);
        }
        Ok(self.0.clone())
    }
}

/// Backend calls the submission client depends on
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one binary audio payload with its JSON metadata sidecar
    async fn upload_binary(
        &self,
        endpoint: &str,
        bytes: Vec<u8>,
        metadata: &UploadMetadata,
    ) -> Result<UploadReceipt, TransportError>;

    async fn post_json(&self, endpoint: &str, body: &Value) -> Result<Value, TransportError>;

    async fn get_json(&self, endpoint: &str) -> Result<Value, TransportError>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, TransportError> {
        let cleaned_url = base_url.trim_end_matches('/');
        info!("Creating HttpTransport with base_url: {}", cleaned_url);

        let parsed = url::Url::parse(cleaned_url)
            .map_err(|e| TransportError::Url(format!("Invalid URL '{}': {}", cleaned_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TransportError::Url(format!(
                "URL must use http or https scheme, got: {}",
                parsed.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: cleaned_url.to_string(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Handle HTTP response and convert to appropriate error
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(error_for_status(status, body))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn upload_binary(
        &self,
        endpoint: &str,
        bytes: Vec<u8>,
        metadata: &UploadMetadata,
    ) -> Result<UploadReceipt, TransportError> {
        let token = self.credentials.bearer_token().await?;
        let url = self.url(endpoint);
        debug!("Uploading {} bytes to {}", bytes.len(), url);

        let audio = reqwest::multipart::Part::bytes(bytes)
            .file_name("sample.wav")
            .mime_str("audio/wav")?;
        let sidecar = reqwest::multipart::Part::text(serde_json::to_string(metadata)?)
            .mime_str("application/json")?;
        let form = reqwest::multipart::Form::new()
            .part("audio", audio)
            .part("metadata", sidecar);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .multipart(form)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    async fn post_json(&self, endpoint: &str, body: &Value) -> Result<Value, TransportError> {
        let token = self.credentials.bearer_token().await?;
        let url = self.url(endpoint);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    async fn get_json(&self, endpoint: &str) -> Result<Value, TransportError> {
        let token = self.credentials.bearer_token().await?;
        let url = self.url(endpoint);
        debug!("GET {}", url);

        let response = self.client.get(&url).bearer_auth(&token).send().await?;

        Self::handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Arc<dyn CredentialProvider> {
        Arc::new(StaticToken("test-token".to_string()))
    }

    #[test]
    fn test_status_mapping_is_distinct() {
        assert_eq!(
            error_for_status(StatusCode::UNAUTHORIZED, String::new()),
            TransportError::Unauthorized
        );
        assert_eq!(
            error_for_status(StatusCode::FORBIDDEN, "nope".to_string()),
            TransportError::Forbidden("nope".to_string())
        );
        assert_eq!(
            error_for_status(StatusCode::NOT_FOUND, "missing".to_string()),
            TransportError::NotFound("missing".to_string())
        );
        assert_eq!(
            error_for_status(StatusCode::UNPROCESSABLE_ENTITY, "bad audio".to_string()),
            TransportError::Unprocessable("bad audio".to_string())
        );
        assert_eq!(
            error_for_status(StatusCode::BAD_GATEWAY, "upstream".to_string()),
            TransportError::Server {
                status: 502,
                body: "upstream".to_string()
            }
        );
        assert_eq!(
            error_for_status(StatusCode::CONFLICT, String::new()),
            TransportError::Status {
                status: 409,
                body: String::new()
            }
        );
    }

    #[test]
    fn test_transport_creation() {
        let transport = HttpTransport::new("http://localhost:8000/api/", Duration::from_secs(5), token());
        assert!(transport.is_ok());
        assert_eq!(transport.unwrap().base_url(), "http://localhost:8000/api");

        let transport = HttpTransport::new("not-a-url", Duration::from_secs(5), token());
        assert!(matches!(transport, Err(TransportError::Url(_))));

        let transport = HttpTransport::new("ftp://localhost", Duration::from_secs(5), token());
        assert!(matches!(transport, Err(TransportError::Url(_))));
    }

    #[test]
    fn test_endpoint_joining() {
        let transport =
            HttpTransport::new("https://api.example.org/v1", Duration::from_secs(5), token()).unwrap();
        assert_eq!(
            transport.url("/voice/samples"),
            "https://api.example.org/v1/voice/samples"
        );
        assert_eq!(
            transport.url("voice/samples/abc/status"),
            "https://api.example.org/v1/voice/samples/abc/status"
        );
    }

    #[tokio::test]
    async fn test_static_token() {
        assert_eq!(
            StaticToken("abc".to_string()).bearer_token().await,
            Ok("abc".to_string())
        );
        assert_eq!(
            StaticToken(String::new()).bearer_token().await,
            Err(TransportError::Unauthorized)
        );
    }

    #[test]
    fn test_json_error_maps_to_decode() {
        let err = serde_json::from_str::<Value>("{not json").unwrap_err();
        assert!(matches!(TransportError::from(err), TransportError::Decode(_)));
    }
}
