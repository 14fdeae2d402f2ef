//! Status reconciliation for the job currently on display.
//!
//! The engine owns at most one [`PollingSession`]. Every check either emits
//! a [`SessionEvent`] for the owner to persist, or schedules the next check
//! through the [`Scheduler`]. The engine never touches storage.

use chrono::Utc;
use common::{ApiError, JobId, JobStatus, StatusPayload};
use crate::client::GenerationApi;
use crate::normalize::{normalize, Observation};
use crate::policy::{
    estimate_progress, execution_cost, next_poll_delay, AMBIGUOUS_RETRY_DELAY, ERROR_RETRY_DELAY,
};
use crate::scheduler::{Scheduler, Tick};
use crate::session::{PollError, PollingSession, SessionEvent};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollingOptions {
    /// Consecutive error/ambiguous retries allowed before giving up.
    /// `None` retries forever.
    pub max_recovery_attempts: Option<u32>,
}

/// A status check that has been started but whose response is not yet applied.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCheck {
    job_id: JobId,
    epoch: u64,
}

impl PendingCheck {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

pub struct StatusEngine<A, S> {
    api: A,
    scheduler: S,
    options: PollingOptions,
    session: Option<PollingSession>,
    epoch: u64,
}

impl<A: GenerationApi, S: Scheduler> StatusEngine<A, S> {
    pub fn new(api: A, scheduler: S, options: PollingOptions) -> Self {
        Self {
            api,
            scheduler,
            options,
            session: None,
            epoch: 0,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn session(&self) -> Option<&PollingSession> {
        self.session.as_ref()
    }

    /// Replaces the current session with one for `job_id`.
    ///
    /// A known video URL settles the session immediately without a network
    /// call. Otherwise the first check runs before this returns.
    pub async fn start(
        &mut self,
        job_id: JobId,
        known_video_url: Option<&str>,
        known_status: Option<JobStatus>,
    ) -> Option<SessionEvent> {
        self.teardown();
        self.epoch += 1;
        let epoch = self.epoch;

        if let Some(url) = known_video_url.map(str::trim).filter(|u| !u.is_empty()) {
            log::info!("Job {} already has a video, nothing to poll", job_id);
            self.session = Some(PollingSession::completed(job_id, url.to_string(), epoch));
            return None;
        }

        let status = match known_status {
            Some(JobStatus::Completed) => {
                log::warn!("Job {} is marked completed but has no video URL, polling again", job_id);
                JobStatus::Pending
            }
            Some(JobStatus::Failed) => {
                log::info!("Job {} was marked failed, checking it again", job_id);
                JobStatus::Pending
            }
            Some(status) => status,
            None => JobStatus::Pending,
        };

        log::info!("Watching job {} (epoch {})", job_id, epoch);
        self.session = Some(PollingSession::new(job_id, status, epoch));
        self.check_now().await
    }

    /// Checks the job now instead of waiting for the scheduled retry.
    ///
    /// Credential and rejection errors are returned so the caller can show
    /// them; the session still records them and keeps its retry schedule.
    pub async fn refresh(&mut self, job_id: &JobId) -> Result<Option<SessionEvent>, ApiError> {
        match self.session.as_mut() {
            Some(session) if &session.job_id == job_id && !session.is_terminal() => {
                session.cancel_retry();
                session.recovery_attempts = 0;
            }
            _ => {
                log::debug!("Refresh of {} ignored, no active session for it", job_id);
                return Ok(None);
            }
        }

        let Some(pending) = self.begin_check() else {
            return Ok(None);
        };
        let outcome = self.api.get_status(&pending.job_id).await;
        let surfaced = match &outcome {
            Err(err) if err.is_user_facing() => Some(err.clone()),
            _ => None,
        };
        let event = self.complete_check(pending, outcome);

        match surfaced {
            Some(err) => Err(err),
            None => Ok(event),
        }
    }

    /// Handles a fired timer. Ticks from torn-down or superseded timers are dropped.
    pub async fn on_tick(&mut self, tick: Tick) -> Option<SessionEvent> {
        match self.session.as_mut() {
            Some(session) if session.owns_tick(&tick) && !session.is_terminal() => {
                session.retry = None;
            }
            _ => {
                log::debug!("Discarding stale tick for {} (epoch {})", tick.job_id, tick.epoch);
                return None;
            }
        }
        self.check_now().await
    }

    /// Cancels the scheduled retry and forgets the session. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.cancel_retry();
            log::debug!("Session for {} torn down", session.job_id);
        }
    }

    /// First half of a status check: stamps the session and records which
    /// session the response will belong to.
    pub fn begin_check(&mut self) -> Option<PendingCheck> {
        let session = self.session.as_mut().filter(|s| !s.is_terminal())?;
        session.last_checked_at = Some(Utc::now());
        session.check_count += 1;
        Some(PendingCheck {
            job_id: session.job_id.clone(),
            epoch: session.epoch,
        })
    }

    /// Second half of a status check: applies the outcome to the live session.
    ///
    /// Responses for a session that has since been replaced, torn down or
    /// settled are discarded.
    pub fn complete_check(
        &mut self,
        pending: PendingCheck,
        outcome: Result<StatusPayload, ApiError>,
    ) -> Option<SessionEvent> {
        let scheduler = &self.scheduler;
        let options = &self.options;
        let session = match self.session.as_mut() {
            Some(s) if s.job_id == pending.job_id && s.epoch == pending.epoch && !s.is_terminal() => s,
            _ => {
                log::debug!("Discarding stale response for {}", pending.job_id);
                return None;
            }
        };

        match outcome {
            Err(err) => {
                log::warn!("Status check for {} failed: {}", session.job_id, err);
                session.last_error = Some(PollError::Api(err));
                recover(scheduler, options, session, ERROR_RETRY_DELAY)
            }
            Ok(payload) => apply_payload(scheduler, options, session, &payload),
        }
    }

    async fn check_now(&mut self) -> Option<SessionEvent> {
        let pending = self.begin_check()?;
        let outcome = self.api.get_status(&pending.job_id).await;
        self.complete_check(pending, outcome)
    }
}

fn apply_payload<S: Scheduler>(
    scheduler: &S,
    options: &PollingOptions,
    session: &mut PollingSession,
    payload: &StatusPayload,
) -> Option<SessionEvent> {
    if let Some(ms) = payload.execution_time_ms {
        let (_, cost) = execution_cost(ms);
        session.execution_time_ms = Some(ms);
        session.estimated_cost = Some(cost);
    }

    match normalize(payload) {
        Observation::Completed { video_url } => {
            session.cancel_retry();
            session.status = JobStatus::Completed;
            session.progress = 100;
            session.video_url = Some(video_url.clone());
            session.recovering = false;
            session.last_error = None;
            log::info!("Job {} completed: {}", session.job_id, video_url);
            Some(SessionEvent::Ready {
                job_id: session.job_id.clone(),
                video_url,
                execution_time_ms: session.execution_time_ms,
            })
        }
        Observation::Failed => {
            session.cancel_retry();
            session.status = JobStatus::Failed;
            session.recovering = false;
            log::info!("Job {} failed", session.job_id);
            Some(SessionEvent::Failed { job_id: session.job_id.clone() })
        }
        Observation::InProgress { delay_time_ms } => {
            let estimate = estimate_progress(session.check_count, delay_time_ms);
            session.status = JobStatus::Processing;
            session.progress = session.progress.max(estimate);
            session.recovering = false;
            session.recovery_attempts = 0;
            session.last_error = None;
            session.schedule_retry(scheduler, next_poll_delay(session.progress));
            Some(SessionEvent::Processing {
                job_id: session.job_id.clone(),
                progress: session.progress,
            })
        }
        Observation::CompletedWithoutUrl => {
            log::warn!("Job {} reported COMPLETED without a video URL", session.job_id);
            session.last_error = Some(PollError::AmbiguousPayload(
                "COMPLETED without a video URL".to_string(),
            ));
            session.recovering = true;
            recover(scheduler, options, session, AMBIGUOUS_RETRY_DELAY)
        }
        Observation::Unrecognized(status) => {
            log::warn!("Job {} reported unrecognised status {:?}", session.job_id, status);
            session.last_error = Some(PollError::AmbiguousPayload(format!(
                "unrecognised status {:?}",
                status
            )));
            session.recovering = true;
            recover(scheduler, options, session, AMBIGUOUS_RETRY_DELAY)
        }
    }
}

/// Schedules a retry after an unsuccessful check, unless the ceiling is reached.
fn recover<S: Scheduler>(
    scheduler: &S,
    options: &PollingOptions,
    session: &mut PollingSession,
    delay: std::time::Duration,
) -> Option<SessionEvent> {
    session.recovery_attempts += 1;

    if let Some(max) = options.max_recovery_attempts {
        if session.recovery_attempts > max {
            session.cancel_retry();
            log::error!(
                "Giving up on job {} after {} failed checks",
                session.job_id,
                session.recovery_attempts
            );
            return Some(SessionEvent::Stalled {
                job_id: session.job_id.clone(),
                attempts: session.recovery_attempts,
            });
        }
    }

    session.schedule_retry(scheduler, delay);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::scheduler::ManualScheduler;
    use crate::testing::{completed, in_progress, status, FakeApi};

    fn setup(options: PollingOptions) -> (StatusEngine<FakeApi, ManualScheduler>, FakeApi, ManualScheduler) {
        let api = FakeApi::default();
        let sched = ManualScheduler::new();
        let engine = StatusEngine::new(api.clone(), sched.clone(), options);
        (engine, api, sched)
    }

    async fn advance(
        engine: &mut StatusEngine<FakeApi, ManualScheduler>,
        sched: &ManualScheduler,
        by: Duration,
    ) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        for tick in sched.advance(by) {
            if let Some(event) = engine.on_tick(tick).await {
                events.push(event);
            }
        }
        events
    }

    fn job() -> JobId {
        JobId::from("job-1")
    }

    #[tokio::test]
    async fn test_in_progress_then_completed() {
        let (mut engine, api, sched) = setup(PollingOptions::default());
        api.push(Ok(in_progress(Some(100_000))));

        let event = engine.start(job(), None, Some(JobStatus::Pending)).await;
        assert_eq!(event, Some(SessionEvent::Processing { job_id: job(), progress: 5 }));
        assert_eq!(sched.next_due_in(), Some(Duration::from_millis(5_000)));

        api.push(Ok(completed("https://cdn/x.mp4", Some(120_000))));
        let events = advance(&mut engine, &sched, Duration::from_millis(5_000)).await;
        assert_eq!(
            events,
            vec![SessionEvent::Ready {
                job_id: job(),
                video_url: "https://cdn/x.mp4".into(),
                execution_time_ms: Some(120_000),
            }]
        );

        let session = engine.session().unwrap();
        assert_eq!(session.status, JobStatus::Completed);
        assert_eq!(session.progress, 100);
        assert_eq!(session.check_count, 2);
        assert!((session.estimated_cost.unwrap() - 0.12).abs() < 1e-9);
        assert_eq!(sched.pending(), 0);
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn test_output_list_wins_over_direct_url() {
        let (mut engine, api, _sched) = setup(PollingOptions::default());
        let mut payload = completed("https://cdn/x.mp4", None);
        payload.output.as_mut().unwrap().video_url = Some("https://cdn/y.mp4".into());
        api.push(Ok(payload));

        engine.start(job(), None, None).await;
        assert_eq!(engine.session().unwrap().video_url.as_deref(), Some("https://cdn/x.mp4"));
    }

    #[tokio::test]
    async fn test_known_url_is_idempotent_and_offline() {
        let (mut engine, api, sched) = setup(PollingOptions::default());

        for _ in 0..2 {
            let event = engine
                .start(job(), Some("https://cdn/x.mp4"), Some(JobStatus::Completed))
                .await;
            assert_eq!(event, None);
            let session = engine.session().unwrap();
            assert_eq!(session.status, JobStatus::Completed);
            assert_eq!(session.progress, 100);
        }
        assert_eq!(api.calls(), 0);
        assert_eq!(sched.pending(), 0);
    }

    #[tokio::test]
    async fn test_completed_without_url_polls_again() {
        let (mut engine, api, _sched) = setup(PollingOptions::default());
        api.push(Ok(in_progress(None)));

        engine.start(job(), None, Some(JobStatus::Completed)).await;
        assert_eq!(api.calls(), 1);
        assert_eq!(engine.session().unwrap().status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_known_failure_without_url_is_checked_again() {
        let (mut engine, api, sched) = setup(PollingOptions::default());
        api.push(Ok(completed("https://cdn/x.mp4", None)));

        let event = engine.start(job(), None, Some(JobStatus::Failed)).await;
        assert_eq!(
            event,
            Some(SessionEvent::Ready {
                job_id: job(),
                video_url: "https://cdn/x.mp4".into(),
                execution_time_ms: None,
            })
        );
        assert_eq!(engine.session().unwrap().status, JobStatus::Completed);
        assert_eq!(api.calls(), 1);
        assert_eq!(sched.pending(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_retries_after_15s() {
        let (mut engine, api, sched) = setup(PollingOptions::default());
        api.push(Err(ApiError::Transport("connection reset".into())));

        assert_eq!(engine.start(job(), None, None).await, None);
        let session = engine.session().unwrap();
        assert_eq!(session.status, JobStatus::Pending);
        assert_eq!(
            session.last_error,
            Some(PollError::Api(ApiError::Transport("connection reset".into())))
        );
        assert_eq!(sched.next_due_in(), Some(Duration::from_secs(15)));

        api.push(Ok(in_progress(None)));
        assert!(advance(&mut engine, &sched, Duration::from_millis(14_999)).await.is_empty());
        assert_eq!(api.calls(), 1);
        assert_eq!(advance(&mut engine, &sched, Duration::from_millis(1)).await.len(), 1);
        assert_eq!(api.calls(), 2);
        assert_eq!(engine.session().unwrap().last_error, None);
    }

    #[tokio::test]
    async fn test_ambiguous_payloads_retry_after_10s() {
        let (mut engine, api, sched) = setup(PollingOptions::default());
        api.push(Ok(in_progress(Some(100_000))));
        engine.start(job(), None, None).await;

        api.push(Ok(status("COMPLETED")));
        assert!(advance(&mut engine, &sched, Duration::from_secs(5)).await.is_empty());
        let session = engine.session().unwrap();
        assert_eq!(session.status, JobStatus::Processing);
        assert!(session.recovering);
        assert!(matches!(session.last_error, Some(PollError::AmbiguousPayload(_))));
        assert_eq!(sched.next_due_in(), Some(Duration::from_secs(10)));

        api.push(Ok(status("IN_QUEUE")));
        assert!(advance(&mut engine, &sched, Duration::from_secs(10)).await.is_empty());
        assert_eq!(engine.session().unwrap().status, JobStatus::Processing);
        assert_eq!(sched.next_due_in(), Some(Duration::from_secs(10)));
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test]
    async fn test_progress_bounded_and_non_decreasing() {
        let (mut engine, api, sched) = setup(PollingOptions::default());
        // a shrinking-then-growing delay hint would move the raw estimate backwards
        let hints = [Some(10_000), None, Some(20_000), Some(5_000), None, Some(1_000)];
        for hint in hints {
            api.push(Ok(in_progress(hint)));
        }

        let mut seen = Vec::new();
        if let Some(SessionEvent::Processing { progress, .. }) = engine.start(job(), None, None).await {
            seen.push(progress);
        }
        while seen.len() < hints.len() {
            let delay = sched.next_due_in().unwrap();
            for event in advance(&mut engine, &sched, delay).await {
                if let SessionEvent::Processing { progress, .. } = event {
                    seen.push(progress);
                }
            }
        }

        assert_eq!(seen[0], 50);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
        assert!(seen.iter().all(|p| *p <= 95));
        assert_eq!(*seen.last().unwrap(), 95);
    }

    #[tokio::test]
    async fn test_teardown_silences_timer() {
        let (mut engine, api, sched) = setup(PollingOptions::default());
        api.push(Ok(in_progress(None)));
        engine.start(job(), None, None).await;
        assert_eq!(sched.pending(), 1);

        engine.teardown();
        engine.teardown();
        assert!(engine.session().is_none());
        assert!(advance(&mut engine, &sched, Duration::from_secs(60)).await.is_empty());
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_replaces_scheduled_retry() {
        let (mut engine, api, sched) = setup(PollingOptions::default());
        api.push(Ok(in_progress(None)));
        api.push(Ok(in_progress(None)));
        api.push(Ok(in_progress(None)));
        engine.start(job(), None, None).await;

        assert!(advance(&mut engine, &sched, Duration::from_secs(2)).await.is_empty());
        let event = engine.refresh(&job()).await.unwrap();
        assert!(matches!(event, Some(SessionEvent::Processing { .. })));
        assert_eq!(api.calls(), 2);
        assert_eq!(sched.pending(), 1);

        // the original 5s timer would have fired here
        assert!(advance(&mut engine, &sched, Duration::from_secs(3)).await.is_empty());
        assert_eq!(api.calls(), 2);
        assert_eq!(advance(&mut engine, &sched, Duration::from_secs(2)).await.len(), 1);
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test]
    async fn test_refresh_without_matching_session_is_noop() {
        let (mut engine, api, _sched) = setup(PollingOptions::default());
        assert_eq!(engine.refresh(&job()).await, Ok(None));

        engine.start(job(), Some("https://cdn/x.mp4"), None).await;
        assert_eq!(engine.refresh(&job()).await, Ok(None));
        assert_eq!(engine.refresh(&JobId::from("other")).await, Ok(None));
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_surfaces_rejection() {
        let (mut engine, api, sched) = setup(PollingOptions::default());
        api.push(Ok(in_progress(None)));
        engine.start(job(), None, None).await;

        let rejection = ApiError::RemoteRejection { status: 401, message: "Invalid API key".into() };
        api.push(Err(rejection.clone()));
        assert_eq!(engine.refresh(&job()).await, Err(rejection.clone()));

        let session = engine.session().unwrap();
        assert_eq!(session.last_error, Some(PollError::Api(rejection)));
        assert_eq!(session.status, JobStatus::Processing);
        assert_eq!(sched.next_due_in(), Some(Duration::from_secs(15)));
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let (mut engine, api, _sched) = setup(PollingOptions::default());
        api.push(Ok(in_progress(None)));
        api.push(Ok(in_progress(None)));
        engine.start(job(), None, None).await;

        let pending = engine.begin_check().unwrap();
        assert_eq!(pending.job_id(), &job());
        engine.start(JobId::from("job-2"), None, None).await;

        let late = engine.complete_check(pending, Ok(completed("https://cdn/x.mp4", None)));
        assert_eq!(late, None);
        let session = engine.session().unwrap();
        assert_eq!(session.job_id, JobId::from("job-2"));
        assert_eq!(session.status, JobStatus::Processing);
        assert_eq!(session.video_url, None);
    }

    #[tokio::test]
    async fn test_restart_of_same_job_discards_old_response() {
        let (mut engine, api, _sched) = setup(PollingOptions::default());
        api.push(Ok(in_progress(None)));
        api.push(Ok(in_progress(None)));
        engine.start(job(), None, None).await;
        let pending = engine.begin_check().unwrap();
        engine.start(job(), None, None).await;

        assert_eq!(engine.complete_check(pending, Ok(status("FAILED"))), None);
        assert_eq!(engine.session().unwrap().status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_stale_tick_is_ignored() {
        let (mut engine, api, _sched) = setup(PollingOptions::default());
        api.push(Ok(in_progress(None)));
        engine.start(job(), None, None).await;

        let tick = Tick { job_id: job(), epoch: 0, seq: 1 };
        assert_eq!(engine.on_tick(tick).await, None);
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_stops_polling() {
        let (mut engine, api, sched) = setup(PollingOptions::default());
        api.push(Ok(in_progress(None)));
        engine.start(job(), None, None).await;

        api.push(Ok(status("FAILED")));
        let events = advance(&mut engine, &sched, Duration::from_secs(5)).await;
        assert_eq!(events, vec![SessionEvent::Failed { job_id: job() }]);
        assert_eq!(sched.pending(), 0);
        assert!(advance(&mut engine, &sched, Duration::from_secs(60)).await.is_empty());
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn test_retries_forever_by_default() {
        let (mut engine, api, sched) = setup(PollingOptions::default());
        engine.start(job(), None, None).await;
        for _ in 0..20 {
            advance(&mut engine, &sched, Duration::from_secs(15)).await;
        }
        assert_eq!(api.calls(), 21);
        assert_eq!(sched.pending(), 1);
        assert_eq!(engine.session().unwrap().recovery_attempts, 21);
    }

    #[tokio::test]
    async fn test_recovery_ceiling_stalls_until_refresh() {
        let (mut engine, api, sched) = setup(PollingOptions { max_recovery_attempts: Some(2) });

        assert_eq!(engine.start(job(), None, None).await, None);
        assert!(advance(&mut engine, &sched, Duration::from_secs(15)).await.is_empty());
        let events = advance(&mut engine, &sched, Duration::from_secs(15)).await;
        assert_eq!(events, vec![SessionEvent::Stalled { job_id: job(), attempts: 3 }]);
        assert_eq!(sched.pending(), 0);
        assert_eq!(api.calls(), 3);

        api.push(Ok(in_progress(None)));
        let event = engine.refresh(&job()).await.unwrap();
        assert!(matches!(event, Some(SessionEvent::Processing { .. })));
        assert_eq!(engine.session().unwrap().recovery_attempts, 0);
        assert_eq!(sched.pending(), 1);
    }
}
