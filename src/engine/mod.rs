//! # engine
//!
//! * [`orchestrator`]: open / close sequencing over the collaborators
//! * [`monitor`]     : background stop-loss / take-profit loop

pub mod monitor;
pub mod orchestrator;

pub use monitor::PositionMonitor;
pub use orchestrator::PositionService;
