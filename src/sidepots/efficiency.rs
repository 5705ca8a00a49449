//! Lineup efficiency standings.
//!
//! A team's weekly efficiency is `actual / optimal` starting lineup
//! points. The season figure is the mean of the weekly ratios, so one
//! high-scoring week does not outweigh the rest. Weeks without usable
//! data are skipped rather than counted as zero.

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;
use tracing::debug;

use crate::types::{rank_sorted, RosterProjection, StandingsRow, RATIO_DP};

/// Rank one week: ratio desc, then actual points desc, then team id asc.
/// Teams without a usable ratio are left out.
pub fn rank_week(projections: &[RosterProjection]) -> Vec<StandingsRow> {
    let mut rows: Vec<(u32, Decimal, Decimal)> = projections
        .iter()
        .filter_map(|p| p.efficiency().map(|ratio| (p.team_id, ratio, p.actual_lineup_points)))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)));
    rank_sorted(rows)
}

#[derive(Debug, Clone, Default, PartialEq)]
struct TeamTotals {
    ratios: Vec<Decimal>,
    total_actual: Decimal,
}

impl TeamTotals {
    fn mean_ratio(&self) -> Option<Decimal> {
        if self.ratios.is_empty() {
            return None;
        }
        let sum: Decimal = self.ratios.iter().sum();
        let mean = sum / Decimal::from(self.ratios.len());
        Some(mean.round_dp_with_strategy(RATIO_DP, RoundingStrategy::MidpointNearestEven))
    }
}

/// Per-team running totals across the processed weeks.
#[derive(Debug, Clone, Default)]
pub struct EfficiencySeason {
    teams: BTreeMap<u32, TeamTotals>,
    weeks: Vec<u32>,
    /// Ranked rows for each folded week, in fold order.
    week_rows: Vec<(u32, Vec<StandingsRow>)>,
}

impl EfficiencySeason {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one week into the season and return that week's standings.
    pub fn add_week(&mut self, week: u32, projections: &[RosterProjection]) -> &[StandingsRow] {
        let mut usable = 0;
        for p in projections.iter().filter(|p| p.week == week) {
            let Some(ratio) = p.efficiency() else {
                continue;
            };
            let totals = self.teams.entry(p.team_id).or_default();
            totals.ratios.push(ratio);
            totals.total_actual += p.actual_lineup_points;
            usable += 1;
        }
        self.weeks.push(week);
        debug!(week, teams = usable, "Folded efficiency week");

        let this_week: Vec<RosterProjection> =
            projections.iter().filter(|p| p.week == week).cloned().collect();
        self.week_rows.push((week, rank_week(&this_week)));
        &self.week_rows[self.week_rows.len() - 1].1
    }

    pub fn weeks(&self) -> &[u32] {
        &self.weeks
    }

    /// Standings of the most recently folded week.
    pub fn latest_week(&self) -> Option<(u32, &[StandingsRow])> {
        self.week_rows.last().map(|(week, rows)| (*week, rows.as_slice()))
    }

    /// Weeks with a usable ratio for `team_id`.
    pub fn weeks_counted(&self, team_id: u32) -> usize {
        self.teams.get(&team_id).map(|t| t.ratios.len()).unwrap_or(0)
    }

    /// Season standings. Metric is the mean weekly ratio, tiebreak is
    /// total actual points. Teams with no usable week are excluded.
    pub fn standings(&self) -> Vec<StandingsRow> {
        let mut rows: Vec<(u32, Decimal, Decimal)> = self
            .teams
            .iter()
            .filter_map(|(team, totals)| totals.mean_ratio().map(|m| (*team, m, totals.total_actual)))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)));
        rank_sorted(rows)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
