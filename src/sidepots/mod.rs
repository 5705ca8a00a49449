//! Sidepot engines.
//!
//! Each engine is a pure state machine over fetched weekly data: no I/O,
//! no clocks. The orchestrator feeds them weeks in ascending order and
//! hands the results to the report formatter.

pub mod efficiency;
pub mod pir;
pub mod survivor;

pub use efficiency::EfficiencySeason;
pub use pir::{PirSeason, PirWeek, Target, TargetRule};
pub use survivor::{EliminationRule, SurvivorPool};
