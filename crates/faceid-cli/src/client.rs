//! Thin HTTP client for the faceidd API.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
}

pub struct ApiClient {
    base_url: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn status(&self) -> Result<Value, ClientError> {
        self.get_json("/status").await
    }

    pub async fn model_info(&self) -> Result<Value, ClientError> {
        self.get_json("/model-info").await
    }

    /// Upload a PDF to `/api/verify-face`.
    pub async fn verify(&self, filename: &str, pdf: Vec<u8>) -> Result<Value, ClientError> {
        let part = Part::bytes(pdf)
            .file_name(filename.to_string())
            .mime_str("application/pdf")?;
        let form = Form::new().part("file", part);

        tracing::debug!(url = %self.url("/api/verify-face"), filename, "uploading document");
        let response = self
            .http
            .post(self.url("/api/verify-face"))
            .multipart(form)
            .send()
            .await?;
        read_json(response).await
    }

    async fn get_json(&self, path: &str) -> Result<Value, ClientError> {
        let response = self.http.get(self.url(path)).send().await?;
        read_json(response).await
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_status() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/status");
                then.status(200)
                    .header("Content-Type", "application/json")
                    .json_body(json!({"status": "healthy", "model_loaded": true, "message": "Service is running"}));
            })
            .await;

        let client = ApiClient::new(&format!("{}/", server.base_url()));
        let body = client.status().await.unwrap();

        mock.assert_async().await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_model_info_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/model-info");
                then.status(503).json_body(json!({"detail": "Model not loaded"}));
            })
            .await;

        let err = ApiClient::new(&server.base_url()).model_info().await.unwrap_err();

        match err {
            ClientError::Status { status, body } => {
                assert_eq!(status, 503);
                assert!(body.contains("Model not loaded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_verify_uploads_file_field() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/verify-face")
                    .body_contains("name=\"file\"")
                    .body_contains("filename=\"id.pdf\"")
                    .body_contains("%PDF-1.4 test");
                then.status(200).json_body(json!({
                    "status": true,
                    "message": "success",
                    "data": {"status": "FAILED", "reason": "Model not initialized"}
                }));
            })
            .await;

        let body = ApiClient::new(&server.base_url())
            .verify("id.pdf", b"%PDF-1.4 test".to_vec())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(body["data"]["reason"], "Model not initialized");
    }
}
