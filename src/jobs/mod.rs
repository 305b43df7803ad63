//! Asynchronous job tracking: store, progress extraction, output
//! classification, and the callback correlation engine.

pub mod classify;
pub mod engine;
pub mod progress;
pub mod store;

pub use classify::{classify_output, OutputKind};
pub use engine::{should_notify, CallbackEvent, JobEngine, JobStatus};
pub use progress::extract_percent;
pub use store::{JobRecord, JobStore};
