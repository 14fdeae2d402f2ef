//! One-shot timers that wake the status engine.
//!
//! A timer never calls back into the engine directly: when it fires it hands
//! a [`Tick`] to whoever drives the engine, which passes it to
//! `StatusEngine::on_tick`. Cancelling the [`TimerHandle`] guarantees the
//! tick is never delivered.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use common::JobId;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// A fired timer, addressed to one polling session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub job_id: JobId,
    pub epoch: u64,
    /// Which of the session's timers fired; only the latest one is honoured.
    pub seq: u64,
}

/// Cancels the timer it was returned for. Dropping the handle does not cancel.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    fn new() -> Self {
        Self { token: CancellationToken::new() }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub trait Scheduler {
    fn schedule_once(&self, delay: Duration, tick: Tick) -> TimerHandle;
}

/// Real-time scheduler: each timer is a tokio task racing a sleep against its token.
#[derive(Clone)]
pub struct TokioScheduler {
    ticks: UnboundedSender<Tick>,
}

impl TokioScheduler {
    pub fn new(ticks: UnboundedSender<Tick>) -> Self {
        Self { ticks }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, tick: Tick) -> TimerHandle {
        let handle = TimerHandle::new();
        let token = handle.token.clone();
        let ticks = self.ticks.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if !token.is_cancelled() && ticks.send(tick).is_err() {
                        log::debug!("Tick receiver dropped, timer discarded");
                    }
                }
            }
        });

        handle
    }
}

struct PendingTimer {
    due: Duration,
    seq: u64,
    tick: Tick,
    handle: TimerHandle,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_seq: u64,
    timers: Vec<PendingTimer>,
}

/// Virtual-time scheduler. Time only moves when [`ManualScheduler::advance`] is called.
///
/// Clones share the same clock, so a test can keep one clone while the
/// engine owns another.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    clock: Arc<Mutex<ManualClock>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of timers that are neither fired nor cancelled.
    pub fn pending(&self) -> usize {
        self.lock()
            .timers
            .iter()
            .filter(|t| !t.handle.is_cancelled())
            .count()
    }

    /// Delay from now until the earliest live timer fires.
    pub fn next_due_in(&self) -> Option<Duration> {
        let clock = self.lock();
        clock
            .timers
            .iter()
            .filter(|t| !t.handle.is_cancelled())
            .map(|t| t.due.saturating_sub(clock.now))
            .min()
    }

    /// Moves the clock forward and returns the ticks that came due, earliest first.
    pub fn advance(&self, by: Duration) -> Vec<Tick> {
        let mut clock = self.lock();
        clock.now += by;
        let now = clock.now;

        let (mut due, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut clock.timers)
            .into_iter()
            .filter(|t| !t.handle.is_cancelled())
            .partition(|t| t.due <= now);
        clock.timers = rest;

        due.sort_by_key(|t| (t.due, t.seq));
        due.into_iter().map(|t| t.tick).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualClock> {
        // a panic while holding this lock already failed the test
        self.clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, delay: Duration, tick: Tick) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut clock = self.lock();
        let seq = clock.next_seq;
        clock.next_seq += 1;
        let due = clock.now + delay;
        clock.timers.push(PendingTimer { due, seq, tick, handle: handle.clone() });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(id: &str, epoch: u64) -> Tick {
        Tick { job_id: JobId::from(id), epoch, seq: 0 }
    }

    #[test]
    fn test_manual_fires_at_due_time() {
        let sched = ManualScheduler::new();
        sched.schedule_once(Duration::from_secs(5), tick("a", 1));

        assert!(sched.advance(Duration::from_millis(4_999)).is_empty());
        assert_eq!(sched.advance(Duration::from_millis(1)), vec![tick("a", 1)]);
        assert_eq!(sched.now(), Duration::from_secs(5));
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn test_manual_cancelled_never_fires() {
        let sched = ManualScheduler::new();
        let handle = sched.schedule_once(Duration::from_secs(5), tick("a", 1));
        handle.cancel();
        assert_eq!(sched.pending(), 0);
        assert!(sched.advance(Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn test_manual_orders_by_due_time() {
        let sched = ManualScheduler::new();
        sched.schedule_once(Duration::from_secs(10), tick("late", 1));
        sched.schedule_once(Duration::from_secs(5), tick("early", 1));
        assert_eq!(sched.next_due_in(), Some(Duration::from_secs(5)));
        assert_eq!(
            sched.advance(Duration::from_secs(10)),
            vec![tick("early", 1), tick("late", 1)]
        );
    }

    #[tokio::test]
    async fn test_tokio_scheduler_delivers_tick() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sched = TokioScheduler::new(tx);
        sched.schedule_once(Duration::from_millis(10), tick("a", 3));
        assert_eq!(rx.recv().await, Some(tick("a", 3)));
    }

    #[tokio::test]
    async fn test_tokio_scheduler_cancel() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sched = TokioScheduler::new(tx);
        let handle = sched.schedule_once(Duration::from_millis(20), tick("a", 1));
        handle.cancel();
        drop(sched);

        // the only sender left belongs to the cancelled task, which exits without sending
        assert_eq!(rx.recv().await, None);
    }
}
