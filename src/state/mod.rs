//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `WorkerState`: the per-worker loop state machine
//! - `ProcessedOutcome`: why a task reached the processed set
//! - `InFlight`: process-local count of tasks being worked on, used to detect
//!   that the whole pool has run out of work

mod in_flight;
mod outcome;
mod worker_state;

// Re-export main types
pub use in_flight::{InFlight, InFlightSlot};
pub use outcome::ProcessedOutcome;
pub use worker_state::WorkerState;
