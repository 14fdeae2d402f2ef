use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One submitted generation request as kept in the local history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    /// Exact JSON body that was sent to the API. Never rewritten.
    pub request_payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl JobRecord {
    pub fn new(id: JobId, prompt: String, request_payload: String) -> Self {
        Self {
            id,
            prompt,
            created_at: Utc::now(),
            status: JobStatus::Pending,
            video_url: None,
            request_payload,
            execution_time_ms: None,
        }
    }

    /// Dollar cost derived from the reported execution time.
    pub fn estimated_cost(&self) -> Option<f64> {
        self.execution_time_ms.map(cost_for_execution)
    }

    pub fn apply(&mut self, update: &JobUpdate) {
        self.status = update.status;
        if let Some(ref url) = update.video_url {
            self.video_url = Some(url.clone());
        }
        if update.execution_time_ms.is_some() {
            self.execution_time_ms = update.execution_time_ms;
        }
    }
}

/// Converts an execution time in milliseconds into the billed amount.
pub fn cost_for_execution(execution_time_ms: u64) -> f64 {
    (execution_time_ms as f64 / 1000.0) * crate::COST_PER_SECOND
}

/// Partial update applied to a stored record.
///
/// Only the constructors below can build one, so a video URL always travels
/// together with the `Completed` status.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    status: JobStatus,
    video_url: Option<String>,
    execution_time_ms: Option<u64>,
}

impl JobUpdate {
    pub fn processing() -> Self {
        Self { status: JobStatus::Processing, video_url: None, execution_time_ms: None }
    }

    pub fn failed() -> Self {
        Self { status: JobStatus::Failed, video_url: None, execution_time_ms: None }
    }

    pub fn completed(video_url: String, execution_time_ms: Option<u64>) -> Self {
        Self {
            status: JobStatus::Completed,
            video_url: Some(video_url),
            execution_time_ms,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }
}
