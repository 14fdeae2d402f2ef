//! Progress estimation and polling delays for a job under reconciliation.

use std::time::Duration;

/// Assumed spacing between checks when back-dating the session start.
pub const ASSUMED_CHECK_SPACING_MS: u64 = 5_000;

/// Generation time assumed when the API gives no `delayTime` hint (15 minutes).
pub const DEFAULT_ESTIMATED_TOTAL_MS: u64 = 900_000;

/// Only an explicit `COMPLETED` may claim 100%.
pub const PROGRESS_CAP: u8 = 95;

/// Retry delay after a transport or decode failure.
pub const ERROR_RETRY_DELAY: Duration = Duration::from_secs(15);

/// Retry delay after a payload that could not be interpreted.
pub const AMBIGUOUS_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Estimated completion percentage for a job still `IN_PROGRESS`.
///
/// Elapsed time is approximated as `check_count` checks spaced
/// [`ASSUMED_CHECK_SPACING_MS`] apart. Once the adaptive policy has slowed to
/// 30s intervals this undercounts; the estimate is a display aid only.
pub fn estimate_progress(check_count: u32, estimated_total_ms: Option<u64>) -> u8 {
    let total = match estimated_total_ms {
        Some(ms) if ms > 0 => ms,
        _ => DEFAULT_ESTIMATED_TOTAL_MS,
    };
    let elapsed = check_count as u64 * ASSUMED_CHECK_SPACING_MS;
    let percent = elapsed.saturating_mul(100) / total;
    percent.min(PROGRESS_CAP as u64) as u8
}

/// Delay until the next automatic check while the job is processing.
pub fn next_poll_delay(progress: u8) -> Duration {
    let secs = match progress {
        0..=19 => 5,
        20..=49 => 10,
        50..=79 => 20,
        _ => 30,
    };
    Duration::from_secs(secs)
}

/// Seconds of execution and the dollar amount they are billed at.
pub fn execution_cost(execution_time_ms: u64) -> (f64, f64) {
    let seconds = execution_time_ms as f64 / 1000.0;
    (seconds, common::job::cost_for_execution(execution_time_ms))
}
