//! Job submission, status reconciliation and history for the text-to-video API.

pub mod client;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod engine;
pub mod logging;
pub mod migrations;
pub mod normalize;
pub mod policy;
pub mod scheduler;
pub mod session;
#[cfg(test)]
mod testing;

pub use client::{GenerationApi, HttpGenerationApi};
pub use config::Config;
pub use dashboard::{Dashboard, DashboardError};
pub use db::SqliteStore;
pub use engine::{PendingCheck, PollingOptions, StatusEngine};
pub use scheduler::{ManualScheduler, Scheduler, Tick, TimerHandle, TokioScheduler};
pub use session::{PollError, PollingSession, SessionEvent};
