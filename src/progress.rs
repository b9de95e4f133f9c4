//! Run progress observability: events emitted by the orchestrator as a sweep advances.

pub mod bus;
pub mod event;

pub use bus::ProgressBus;
pub use event::{JobFinishedData, RunEvent, StatusCounts};
