//! Kernel - handler dispatch, single-flight scheduling and overrides.

mod dispatcher;
mod overrides;
mod scheduler;

pub use dispatcher::HandlerRegistry;
pub use overrides::{ControlBus, OverrideController, OverrideOutcome, Route, TaskRequest};
pub use scheduler::{Scheduler, SchedulerStatus};
