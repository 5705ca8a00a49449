//! Price Is Right: closest score to a weekly target without going over.
//!
//! Each week every team's score is compared with the week's target.
//! Teams at or under the target qualify and are ranked by points
//! descending; teams over it are disqualified for that week and never
//! ranked. A week where everyone went over has no winner.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::types::{rank_sorted, SidepotError, StandingsRow, TeamWeekRecord};

/// Target used when no override or target teams are configured.
pub const DEFAULT_TARGET: Decimal = dec!(150.00);

/// Scores are compared in hundredths.
pub const DEFAULT_PRECISION_DP: u32 = 2;

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// How the weekly target is chosen.
///
/// Precedence: a per-week override, then the combined score of the two
/// target teams, then the default target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRule {
    pub default_target: Decimal,
    pub week_targets: BTreeMap<u32, Decimal>,
    /// Two teams whose combined weekly score is the target.
    pub target_teams: Option<(u32, u32)>,
    pub precision_dp: u32,
}

impl Default for TargetRule {
    fn default() -> Self {
        Self {
            default_target: DEFAULT_TARGET,
            week_targets: BTreeMap::new(),
            target_teams: None,
            precision_dp: DEFAULT_PRECISION_DP,
        }
    }
}

impl TargetRule {
    pub fn fixed(target: Decimal) -> Self {
        Self {
            default_target: target,
            ..Self::default()
        }
    }

    /// Target for `week`, given that week's records.
    pub fn target_for(&self, week: u32, records: &[TeamWeekRecord]) -> Result<Target, SidepotError> {
        let value = if let Some(target) = self.week_targets.get(&week) {
            *target
        } else if let Some((a, b)) = self.target_teams {
            let points = |team: u32| {
                records
                    .iter()
                    .find(|r| r.team_id == team && r.week == week)
                    .map(|r| r.points_scored)
                    .ok_or_else(|| SidepotError::MissingTarget {
                        week,
                        reason: format!("no score for target team {team}"),
                    })
            };
            points(a)? + points(b)?
        } else {
            self.default_target
        };

        if value <= Decimal::ZERO {
            return Err(SidepotError::MissingTarget {
                week,
                reason: format!("target {value} is not positive"),
            });
        }
        Ok(Target::new(week, value, self.precision_dp))
    }
}

/// The threshold for one week, already rounded to the comparison precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub week: u32,
    pub value: Decimal,
    pub precision_dp: u32,
}

impl Target {
    pub fn new(week: u32, value: Decimal, precision_dp: u32) -> Self {
        let mut target = Self {
            week,
            value,
            precision_dp,
        };
        target.value = target.round(value);
        target
    }

    pub fn round(&self, points: Decimal) -> Decimal {
        points.round_dp_with_strategy(self.precision_dp, RoundingStrategy::MidpointAwayFromZero)
    }
}

// ---------------------------------------------------------------------------
// Weekly evaluation
// ---------------------------------------------------------------------------

/// One team's score relative to the week's target.
#[derive(Debug, Clone, PartialEq)]
pub struct PirEntry {
    pub team_id: u32,
    pub points: Decimal,
    /// `target - points`; negative for disqualified teams.
    pub delta: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PirWeek {
    pub week: u32,
    pub target: Decimal,
    /// Points ≤ target, ranked by points desc then team id asc.
    pub qualifying: Vec<PirEntry>,
    /// Points > target, ordered by team id.
    pub disqualified: Vec<PirEntry>,
}

impl PirWeek {
    /// `None` when no team stayed at or under the target.
    pub fn winner(&self) -> Option<&PirEntry> {
        self.qualifying.first()
    }

    /// Ranked qualifying teams. Metric is points, tiebreak is the delta.
    pub fn standings(&self) -> Vec<StandingsRow> {
        rank_sorted(
            self.qualifying
                .iter()
                .map(|e| (e.team_id, e.points, e.delta))
                .collect(),
        )
    }
}

pub fn evaluate_week(week: u32, target: &Target, records: &[TeamWeekRecord]) -> PirWeek {
    let mut qualifying = Vec::new();
    let mut disqualified = Vec::new();

    for record in records.iter().filter(|r| r.week == week) {
        let points = target.round(record.points_scored);
        let entry = PirEntry {
            team_id: record.team_id,
            points,
            delta: target.value - points,
        };
        if points <= target.value {
            qualifying.push(entry);
        } else {
            disqualified.push(entry);
        }
    }

    qualifying.sort_by(|a, b| b.points.cmp(&a.points).then(a.team_id.cmp(&b.team_id)));
    disqualified.sort_by_key(|e| e.team_id);

    debug!(
        week,
        target = %target.value,
        qualifying = qualifying.len(),
        disqualified = disqualified.len(),
        "Evaluated Price Is Right week"
    );

    PirWeek {
        week,
        target: target.value,
        qualifying,
        disqualified,
    }
}

// ---------------------------------------------------------------------------
// Season aggregation
// ---------------------------------------------------------------------------

/// A qualifying single-week score.
#[derive(Debug, Clone, PartialEq)]
pub struct PirFinish {
    pub week: u32,
    pub team_id: u32,
    pub points: Decimal,
    pub delta: Decimal,
}

/// Weekly wins accumulated across the processed weeks.
#[derive(Debug, Clone, Default)]
pub struct PirSeason {
    weeks: Vec<PirWeek>,
    wins: BTreeMap<u32, u32>,
    qualifying_points: BTreeMap<u32, Decimal>,
    teams: BTreeSet<u32>,
}

impl PirSeason {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_week(&mut self, week: PirWeek) {
        for entry in week.qualifying.iter().chain(week.disqualified.iter()) {
            self.teams.insert(entry.team_id);
        }
        for entry in &week.qualifying {
            *self.qualifying_points.entry(entry.team_id).or_default() += entry.points;
        }
        if let Some(winner) = week.winner() {
            *self.wins.entry(winner.team_id).or_default() += 1;
        }
        self.weeks.push(week);
    }

    pub fn weeks(&self) -> &[PirWeek] {
        &self.weeks
    }

    pub fn wins_for(&self, team_id: u32) -> u32 {
        self.wins.get(&team_id).copied().unwrap_or(0)
    }

    /// Every team seen, by wins desc, then points in qualifying weeks
    /// desc, then team id asc.
    pub fn standings(&self) -> Vec<StandingsRow> {
        let mut rows: Vec<(u32, Decimal, Decimal)> = self
            .teams
            .iter()
            .map(|team| {
                (
                    *team,
                    Decimal::from(self.wins_for(*team)),
                    self.qualifying_points.get(team).copied().unwrap_or_default(),
                )
            })
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)));
        rank_sorted(rows)
    }

    /// The `n` closest qualifying scores across all processed weeks.
    pub fn closest_finishes(&self, n: usize) -> Vec<PirFinish> {
        let mut finishes: Vec<PirFinish> = self
            .weeks
            .iter()
            .flat_map(|w| {
                w.qualifying.iter().map(move |e| PirFinish {
                    week: w.week,
                    team_id: e.team_id,
                    points: e.points,
                    delta: e.delta,
                })
            })
            .collect();
        finishes.sort_by(|a, b| {
            a.delta
                .cmp(&b.delta)
                .then(b.points.cmp(&a.points))
                .then(a.week.cmp(&b.week))
                .then(a.team_id.cmp(&b.team_id))
        });
        finishes.truncate(n);
        finishes
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
