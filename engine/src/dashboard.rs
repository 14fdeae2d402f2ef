use common::{
    ApiError, GenerationInput, HistoryStore, InputError, JobId, JobRecord, JobUpdate, StoreError,
};
use tokio::sync::mpsc::UnboundedReceiver;
use crate::client::GenerationApi;
use crate::engine::StatusEngine;
use crate::scheduler::{Scheduler, Tick};
use crate::session::{PollingSession, SessionEvent};

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("Job {0} not found in history")]
    UnknownJob(JobId),
    #[error("Stored request for job {0} cannot be replayed: {1}")]
    Replay(JobId, String),
}

/// Ties the selected history record to the status engine.
///
/// The dashboard is the only component that writes engine events to the
/// history store, and it mirrors every write into `selected`.
pub struct Dashboard<A, S> {
    history: HistoryStore,
    engine: StatusEngine<A, S>,
    selected: Option<JobRecord>,
}

impl<A: GenerationApi, S: Scheduler> Dashboard<A, S> {
    pub fn new(history: HistoryStore, engine: StatusEngine<A, S>) -> Self {
        Self { history, engine, selected: None }
    }

    pub fn api(&self) -> &A {
        self.engine.api()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn selected(&self) -> Option<&JobRecord> {
        self.selected.as_ref()
    }

    pub fn session(&self) -> Option<&PollingSession> {
        self.engine.session()
    }

    /// True once the selected job needs no further automatic checks.
    pub fn is_settled(&self) -> bool {
        self.engine
            .session()
            .map_or(true, |s| s.is_terminal() || !s.has_scheduled_retry())
    }

    /// Submits a new generation, records it and starts watching it.
    pub async fn submit(&mut self, input: GenerationInput) -> Result<JobRecord, DashboardError> {
        input.validate()?;
        let prompt = input.prompt.trim().to_string();
        let request = input.into_request();
        let payload = request.to_pretty_json().map_err(StoreError::from)?;

        let response = self.engine.api().submit(&request).await?;
        let record = JobRecord::new(response.id, prompt, payload);
        self.history.append(record.clone())?;
        log::info!("Job {} added to history", record.id);

        self.select(&record.id).await?;
        Ok(self.selected.clone().unwrap_or(record))
    }

    /// Switches the display to `id`, replacing the previous session.
    pub async fn select(&mut self, id: &JobId) -> Result<Option<SessionEvent>, DashboardError> {
        let record = self
            .history
            .get(id)
            .ok_or_else(|| DashboardError::UnknownJob(id.clone()))?;

        self.engine.teardown();
        let known_url = record.video_url.clone();
        let known_status = record.status;
        self.selected = Some(record);

        let event = self
            .engine
            .start(id.clone(), known_url.as_deref(), Some(known_status))
            .await;
        if let Some(ref event) = event {
            self.apply(event)?;
        }
        Ok(event)
    }

    /// Selects the newest record, returning its id.
    pub async fn select_latest(&mut self) -> Result<Option<JobId>, DashboardError> {
        let Some(latest) = self.history.recent(1).into_iter().next() else {
            return Ok(None);
        };
        self.select(&latest.id).await?;
        Ok(Some(latest.id))
    }

    /// Manual check of the selected job.
    pub async fn refresh(&mut self) -> Result<Option<SessionEvent>, DashboardError> {
        let Some(id) = self.selected.as_ref().map(|r| r.id.clone()) else {
            return Ok(None);
        };
        let event = self.engine.refresh(&id).await?;
        if let Some(ref event) = event {
            self.apply(event)?;
        }
        Ok(event)
    }

    pub async fn on_tick(&mut self, tick: Tick) -> Result<Option<SessionEvent>, DashboardError> {
        let event = self.engine.on_tick(tick).await;
        if let Some(ref event) = event {
            self.apply(event)?;
        }
        Ok(event)
    }

    /// Waits for the next timer and processes it. `Ok(None)` when the tick
    /// was stale or the channel closed.
    pub async fn next_event(
        &mut self,
        ticks: &mut UnboundedReceiver<Tick>,
    ) -> Result<Option<SessionEvent>, DashboardError> {
        match ticks.recv().await {
            Some(tick) => self.on_tick(tick).await,
            None => Ok(None),
        }
    }

    /// Persists an engine event and mirrors it into the selected record.
    pub fn apply(&mut self, event: &SessionEvent) -> Result<(), StoreError> {
        let update = match event {
            SessionEvent::Processing { .. } => JobUpdate::processing(),
            SessionEvent::Ready { video_url, execution_time_ms, .. } => {
                JobUpdate::completed(video_url.clone(), *execution_time_ms)
            }
            SessionEvent::Failed { .. } => JobUpdate::failed(),
            SessionEvent::Stalled { job_id, attempts } => {
                log::warn!("Stopped polling {} after {} attempts", job_id, attempts);
                return Ok(());
            }
        };

        let job_id = event.job_id();
        if !self.history.update_by_id(job_id, &update)? {
            log::warn!("Job {} is no longer in history, update dropped", job_id);
        }
        if let Some(selected) = self.selected.as_mut().filter(|r| &r.id == job_id) {
            selected.apply(&update);
        }
        Ok(())
    }

    pub fn delete(&mut self, id: &JobId) -> Result<bool, DashboardError> {
        let removed = self.history.delete_by_id(id)?;
        if self.selected.as_ref().map_or(false, |r| &r.id == id) {
            self.engine.teardown();
            self.selected = None;
        }
        Ok(removed)
    }

    pub fn clear_history(&mut self) -> Result<(), DashboardError> {
        self.history.clear_all()?;
        self.engine.teardown();
        self.selected = None;
        Ok(())
    }

    /// Rebuilds the generation input of a past job for resubmission.
    pub fn replay(&self, id: &JobId) -> Result<GenerationInput, DashboardError> {
        let record = self
            .history
            .get(id)
            .ok_or_else(|| DashboardError::UnknownJob(id.clone()))?;
        GenerationInput::from_request_payload(&record.request_payload)
            .map_err(|e| DashboardError::Replay(id.clone(), format!("{:#}", e)))
    }
}
