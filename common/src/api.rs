use serde::{Deserialize, Serialize};
use crate::job::JobId;

/// Body returned by `POST /run`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitResponse {
    pub id: JobId,
    pub status: String,
}

/// Body returned by `GET /status/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusPayload {
    #[serde(default)]
    pub id: String,
    pub status: String,
    /// Server-side estimate of the remaining wait, in milliseconds.
    #[serde(rename = "delayTime", default, skip_serializing_if = "Option::is_none")]
    pub delay_time_ms: Option<u64>,
    #[serde(rename = "executionTime", default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(rename = "workerId", default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<StatusOutput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl StatusPayload {
    /// Resolves the finished video URL.
    ///
    /// A non-empty first entry of `output.output` wins over `output.video_url`.
    pub fn video_url(&self) -> Option<&str> {
        let output = self.output.as_ref()?;
        let listed = output
            .output
            .as_ref()
            .and_then(|urls| urls.first())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty());
        listed.or_else(|| {
            output
                .video_url
                .as_deref()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
        })
    }
}
