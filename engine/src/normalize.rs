use common::StatusPayload;

/// What one status payload says about the job, reduced to the cases the engine acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Completed { video_url: String },
    /// `COMPLETED` but no usable URL anywhere in the payload.
    CompletedWithoutUrl,
    Failed,
    InProgress { delay_time_ms: Option<u64> },
    /// Any status string the engine does not recognise (including queue states).
    Unrecognized(String),
}

pub fn normalize(payload: &StatusPayload) -> Observation {
    match payload.status.trim() {
        "COMPLETED" => match payload.video_url() {
            Some(url) => Observation::Completed { video_url: url.to_string() },
            None => Observation::CompletedWithoutUrl,
        },
        "FAILED" => Observation::Failed,
        "IN_PROGRESS" => Observation::InProgress { delay_time_ms: payload.delay_time_ms },
        other => Observation::Unrecognized(other.to_string()),
    }
}
