//! League data sources.
//!
//! Defines the `LeagueDataSource` trait consumed by the orchestrator and
//! provides the ESPN fantasy implementation. League id and season are bound
//! into each source when it is constructed.

pub mod espn;
pub mod lineup;

use async_trait::async_trait;

use crate::types::{LeagueProfile, Matchup, RosterProjection, SidepotError, TeamWeekRecord};

/// Abstraction over the fantasy league provider.
///
/// Every call may fail with `AuthRejected` (credentials expired or
/// invalid) or `TransientNetwork` (timeouts, 5xx, bot-protection pages).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LeagueDataSource: Send + Sync {
    /// Season length, scoring progress, lineup slots and team labels.
    async fn fetch_league_profile(&self) -> Result<LeagueProfile, SidepotError>;

    /// Scheduled matchups for a scoring week.
    async fn fetch_matchups(&self, week: u32) -> Result<Vec<Matchup>, SidepotError>;

    /// One record per team for a scoring week.
    async fn fetch_week_scores(&self, week: u32) -> Result<Vec<TeamWeekRecord>, SidepotError>;

    /// Actual and optimal starting lineup points per team for a week.
    async fn fetch_rosters_with_projections(
        &self,
        week: u32,
    ) -> Result<Vec<RosterProjection>, SidepotError>;
}
