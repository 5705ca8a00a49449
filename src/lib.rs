//! SIDEPOTS: fantasy football side competitions
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod guard;
pub mod schedule;
pub mod retry;
pub mod data;
pub mod sidepots;
pub mod report;
pub mod notify;
pub mod engine;
