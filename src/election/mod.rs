//! The leadership state machine and the pieces it drives.

mod dispatcher;
pub mod engine;
mod scheduler;

pub(crate) use dispatcher::CallbackDispatcher;
pub use engine::{ElectionEngine, ObservedLease, Outcome};
pub(crate) use scheduler::{RenewalScheduler, StatusPublisher};
pub use scheduler::{LeadershipStatus, SchedulerState};
