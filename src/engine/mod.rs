//! Core engine: resolve weeks, compute each sidepot, dispatch its report.

pub mod dispatch;
pub mod orchestrator;
