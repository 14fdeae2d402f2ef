use std::time::Duration;
use chrono::{DateTime, Utc};
use common::{ApiError, JobId, JobStatus};
use crate::scheduler::{Scheduler, Tick, TimerHandle};

/// Why the last check did not move the job forward.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Ambiguous status payload: {0}")]
    AmbiguousPayload(String),
}

/// Emitted by the engine when a check changes what the job's owner should record.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Processing { job_id: JobId, progress: u8 },
    Ready { job_id: JobId, video_url: String, execution_time_ms: Option<u64> },
    Failed { job_id: JobId },
    /// The recovery ceiling was reached; polling stopped without a terminal status.
    Stalled { job_id: JobId, attempts: u32 },
}

impl SessionEvent {
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Processing { job_id, .. }
            | Self::Ready { job_id, .. }
            | Self::Failed { job_id }
            | Self::Stalled { job_id, .. } => job_id,
        }
    }
}

/// Live reconciliation state for the job currently on display.
#[derive(Debug)]
pub struct PollingSession {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Set while the last payload could not be interpreted and a retry is pending.
    pub recovering: bool,
    pub progress: u8,
    pub video_url: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub check_count: u32,
    pub last_error: Option<PollError>,
    pub execution_time_ms: Option<u64>,
    pub estimated_cost: Option<f64>,
    /// Consecutive error or ambiguous retries since the last clean observation.
    pub recovery_attempts: u32,
    pub(crate) epoch: u64,
    pub(crate) timer_seq: u64,
    pub(crate) retry: Option<TimerHandle>,
}

impl PollingSession {
    pub(crate) fn new(job_id: JobId, status: JobStatus, epoch: u64) -> Self {
        Self {
            job_id,
            status,
            recovering: false,
            progress: 0,
            video_url: None,
            last_checked_at: None,
            check_count: 0,
            last_error: None,
            execution_time_ms: None,
            estimated_cost: None,
            recovery_attempts: 0,
            epoch,
            timer_seq: 0,
            retry: None,
        }
    }

    pub(crate) fn completed(job_id: JobId, video_url: String, epoch: u64) -> Self {
        let mut session = Self::new(job_id, JobStatus::Completed, epoch);
        session.progress = 100;
        session.video_url = Some(video_url);
        session
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether an automatic check is currently scheduled.
    pub fn has_scheduled_retry(&self) -> bool {
        self.retry.as_ref().map_or(false, |h| !h.is_cancelled())
    }

    pub(crate) fn cancel_retry(&mut self) {
        if let Some(handle) = self.retry.take() {
            handle.cancel();
        }
    }

    /// Replaces any scheduled check with one `delay` from now.
    pub(crate) fn schedule_retry<S: Scheduler>(&mut self, scheduler: &S, delay: Duration) {
        self.cancel_retry();
        self.timer_seq += 1;
        let tick = Tick {
            job_id: self.job_id.clone(),
            epoch: self.epoch,
            seq: self.timer_seq,
        };
        self.retry = Some(scheduler.schedule_once(delay, tick));
    }

    /// Whether `tick` was produced by the timer this session is waiting on.
    pub(crate) fn owns_tick(&self, tick: &Tick) -> bool {
        tick.job_id == self.job_id
            && tick.epoch == self.epoch
            && tick.seq == self.timer_seq
            && self.has_scheduled_retry()
    }
}
