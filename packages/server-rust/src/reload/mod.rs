//! Event-driven rebuilding of the implementation registry.

pub mod controller;
pub mod events;

pub use controller::{ReloadController, ReloadError, ReloadOutcome, ReloadReport, SkippedRecord};
pub use events::{EntityKind, EventBus, SystemEvent};
