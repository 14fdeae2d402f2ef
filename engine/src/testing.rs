//! Scripted in-memory API shared by the engine and dashboard tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use common::{ApiError, GenerationRequest, JobId, StatusOutput, StatusPayload, SubmitResponse};
use crate::client::GenerationApi;

#[derive(Default)]
struct Script {
    submissions: VecDeque<Result<SubmitResponse, ApiError>>,
    responses: VecDeque<Result<StatusPayload, ApiError>>,
    submitted: Vec<GenerationRequest>,
    calls: Vec<JobId>,
}

/// Clones share one script, so a test keeps a handle while the engine owns another.
#[derive(Clone, Default)]
pub struct FakeApi {
    script: Arc<Mutex<Script>>,
}

impl FakeApi {
    pub fn push(&self, response: Result<StatusPayload, ApiError>) {
        self.script.lock().unwrap().responses.push_back(response);
    }

    pub fn push_submit(&self, response: Result<SubmitResponse, ApiError>) {
        self.script.lock().unwrap().submissions.push_back(response);
    }

    /// Number of status calls made so far.
    pub fn calls(&self) -> usize {
        self.script.lock().unwrap().calls.len()
    }

    pub fn submitted(&self) -> Vec<GenerationRequest> {
        self.script.lock().unwrap().submitted.clone()
    }
}

#[async_trait]
impl GenerationApi for FakeApi {
    async fn submit(&self, request: &GenerationRequest) -> Result<SubmitResponse, ApiError> {
        let mut script = self.script.lock().unwrap();
        script.submitted.push(request.clone());
        script
            .submissions
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Transport("no scripted submission".into())))
    }

    async fn get_status(&self, job_id: &JobId) -> Result<StatusPayload, ApiError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(job_id.clone());
        script
            .responses
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Transport("no scripted response".into())))
    }
}

pub fn status(s: &str) -> StatusPayload {
    StatusPayload { id: "job-1".into(), status: s.into(), ..Default::default() }
}

pub fn in_progress(delay_time_ms: Option<u64>) -> StatusPayload {
    StatusPayload { delay_time_ms, ..status("IN_PROGRESS") }
}

pub fn completed(url: &str, execution_time_ms: Option<u64>) -> StatusPayload {
    StatusPayload {
        execution_time_ms,
        output: Some(StatusOutput {
            output: Some(vec![url.to_string()]),
            ..Default::default()
        }),
        ..status("COMPLETED")
    }
}
