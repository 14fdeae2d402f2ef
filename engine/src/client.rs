use std::path::Path;
use std::time::Duration;
use anyhow::Context;
use async_trait::async_trait;
use common::{ApiError, CredentialStore, GenerationRequest, JobId, StatusPayload, SubmitResponse};
use serde::de::DeserializeOwned;

/// The remote text-to-video service.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    /// Starts a generation job.
    async fn submit(&self, request: &GenerationRequest) -> Result<SubmitResponse, ApiError>;

    /// Fetches the raw status of a job.
    async fn get_status(&self, job_id: &JobId) -> Result<StatusPayload, ApiError>;
}

/// HTTP client for the generation API.
///
/// The API key is read from the credential store on every call, so a key
/// set while a job is being watched is picked up by the next check.
pub struct HttpGenerationApi {
    client: reqwest::Client,
    base_url: String,
    credentials: CredentialStore,
}

impl HttpGenerationApi {
    pub fn new(base_url: &str, credentials: CredentialStore, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Saves a finished video to `dest`, returning the number of bytes written.
    pub async fn download(&self, url: &str, dest: &Path) -> anyhow::Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await.context("Failed to read video body")?;
        tokio::fs::write(dest, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;

        log::info!("Downloaded {} bytes from {} to {}", bytes.len(), url, dest.display());
        Ok(bytes.len() as u64)
    }

    fn api_key(&self) -> Result<String, ApiError> {
        self.credentials.get().ok_or(ApiError::CredentialMissing)
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        log::error!("API error response ({}): {}", status, body);

        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                format!(
                    "API error: {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("")
                )
                .trim_end()
                .to_string()
            });

        Err(ApiError::RemoteRejection { status: status.as_u16(), message })
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl GenerationApi for HttpGenerationApi {
    async fn submit(&self, request: &GenerationRequest) -> Result<SubmitResponse, ApiError> {
        let api_key = self.api_key()?;
        log::debug!("Submitting generation request: {:?}", request);

        let response = self
            .client
            .post(format!("{}/run", self.base_url))
            .header(reqwest::header::ACCEPT, "application/json")
            .header(common::API_KEY_HEADER, api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let submitted: SubmitResponse = Self::parse_response(response).await?;
        log::info!("Generation job {} submitted ({})", submitted.id, submitted.status);
        Ok(submitted)
    }

    async fn get_status(&self, job_id: &JobId) -> Result<StatusPayload, ApiError> {
        let api_key = self.api_key()?;

        let response = self
            .client
            .get(format!("{}/status/{}", self.base_url, job_id))
            .header(reqwest::header::ACCEPT, "application/json")
            .header(common::API_KEY_HEADER, api_key)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let payload: StatusPayload = Self::parse_response(response).await?;
        log::debug!("Status of {}: {:?}", job_id, payload);
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use common::{GenerationInput, MemoryStore};

    fn api() -> HttpGenerationApi {
        let creds = CredentialStore::new(Arc::new(MemoryStore::new()));
        // port 9 (discard) on localhost: nothing should ever be sent in these tests
        HttpGenerationApi::new("http://127.0.0.1:9/", creds, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(api().base_url(), "http://127.0.0.1:9");
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let api = api();
        let request = GenerationInput::new("a cat").into_request();
        assert_eq!(api.submit(&request).await, Err(ApiError::CredentialMissing));
        assert_eq!(
            api.get_status(&JobId::from("job-1")).await,
            Err(ApiError::CredentialMissing)
        );
    }
}
