//! Worker orchestration
//!
//! The scoring pipeline and the scheduler that drives its fast, full and
//! clustering cycles.

mod history;
mod orchestrator;
mod pipeline;

pub use history::{VenueCounts, VolumeHistory};
pub use orchestrator::{Orchestrator, CYCLE_ERRORS};
pub use pipeline::{CycleError, CycleKind, CycleReport, Pipeline};
