//! Survivor pool.
//!
//! Every entrant starts alive. From the start week on, each processed
//! week removes the entrants matching the league's elimination rule.
//! Elimination is permanent, so weeks must be processed in ascending
//! order. The pool is decided once at most one entrant remains alive.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

use crate::types::{Outcome, SidepotError, TeamWeekRecord};

// ---------------------------------------------------------------------------
// Rule and state
// ---------------------------------------------------------------------------

/// Which weekly result eliminates an entrant. Chosen per league.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EliminationRule {
    /// The lowest score among alive entrants; ties go out together.
    LowestScore,
    /// Any alive entrant whose team lost its matchup.
    HeadToHeadLoss,
}

impl fmt::Display for EliminationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EliminationRule::LowestScore => write!(f, "lowest_score"),
            EliminationRule::HeadToHeadLoss => write!(f, "head_to_head_loss"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntrantStatus {
    Alive,
    Eliminated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivorEntry {
    pub week: u32,
    pub team_id: u32,
    pub status: EntrantStatus,
}

/// One entrant's week-by-week history.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SurvivorState {
    pub history: Vec<SurvivorEntry>,
}

impl SurvivorState {
    pub fn is_alive(&self) -> bool {
        self.history
            .last()
            .map(|e| e.status == EntrantStatus::Alive)
            .unwrap_or(true)
    }

    pub fn last_processed_week(&self) -> Option<u32> {
        self.history.last().map(|e| e.week)
    }

    /// The week this entrant was eliminated, if any.
    pub fn eliminated_in(&self) -> Option<u32> {
        self.history
            .iter()
            .find(|e| e.status == EntrantStatus::Eliminated)
            .map(|e| e.week)
    }
}

/// An entrant knocked out in a given week.
#[derive(Debug, Clone, PartialEq)]
pub struct Elimination {
    pub week: u32,
    pub team_id: u32,
    pub points: Decimal,
}

/// What happened when a week was processed.
#[derive(Debug, Clone, PartialEq)]
pub enum WeekOutcome {
    /// Before the start week; nobody can be eliminated yet.
    BeforeStart,
    /// The pool was already decided; the week was not evaluated.
    Concluded,
    /// Entrants removed this week (empty when nobody matched the rule).
    /// More than one entry is a joint elimination.
    Eliminated(Vec<Elimination>),
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SurvivorPool {
    rule: EliminationRule,
    start_week: u32,
    entrants: BTreeMap<u32, SurvivorState>,
    eliminations: Vec<Elimination>,
}

impl SurvivorPool {
    pub fn new(rule: EliminationRule, start_week: u32, entrants: impl IntoIterator<Item = u32>) -> Self {
        Self {
            rule,
            start_week: start_week.max(1),
            entrants: entrants
                .into_iter()
                .map(|team| (team, SurvivorState::default()))
                .collect(),
            eliminations: Vec::new(),
        }
    }

    pub fn rule(&self) -> EliminationRule {
        self.rule
    }

    /// Alive entrants, ascending by team id.
    pub fn alive(&self) -> Vec<u32> {
        self.entrants
            .iter()
            .filter(|(_, state)| state.is_alive())
            .map(|(team, _)| *team)
            .collect()
    }

    pub fn is_concluded(&self) -> bool {
        self.alive().len() <= 1
    }

    /// The last entrant standing. `None` while the pool is running, and
    /// also when a joint elimination removed every remaining entrant.
    pub fn winner(&self) -> Option<u32> {
        match self.alive().as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Eliminations in processing order.
    pub fn eliminations(&self) -> &[Elimination] {
        &self.eliminations
    }

    pub fn entrant(&self, team_id: u32) -> Option<&SurvivorState> {
        self.entrants.get(&team_id)
    }

    pub fn process_week(
        &mut self,
        week: u32,
        records: &[TeamWeekRecord],
    ) -> Result<WeekOutcome, SidepotError> {
        if let Some(last_processed) = self
            .entrants
            .values()
            .filter_map(SurvivorState::last_processed_week)
            .max()
        {
            if last_processed >= week {
                return Err(SidepotError::OutOfOrderWeek {
                    week,
                    last_processed,
                });
            }
        }

        let outcome = if self.is_concluded() {
            WeekOutcome::Concluded
        } else if week < self.start_week {
            WeekOutcome::BeforeStart
        } else {
            WeekOutcome::Eliminated(self.select_eliminated(week, records))
        };

        let knocked_out: Vec<u32> = match &outcome {
            WeekOutcome::Eliminated(out) => out.iter().map(|e| e.team_id).collect(),
            _ => Vec::new(),
        };

        for (team, state) in self.entrants.iter_mut() {
            let status = if !state.is_alive() || knocked_out.contains(team) {
                EntrantStatus::Eliminated
            } else {
                EntrantStatus::Alive
            };
            state.history.push(SurvivorEntry {
                week,
                team_id: *team,
                status,
            });
        }

        if let WeekOutcome::Eliminated(out) = &outcome {
            self.eliminations.extend(out.iter().cloned());
            if out.len() > 1 {
                info!(week, teams = ?knocked_out, "Joint survivor elimination");
            }
            if let Some(winner) = self.winner() {
                info!(week, winner, "Survivor pool decided");
            }
        }

        debug!(week, alive = self.alive().len(), outcome = ?outcome, "Processed survivor week");
        Ok(outcome)
    }

    fn select_eliminated(&self, week: u32, records: &[TeamWeekRecord]) -> Vec<Elimination> {
        let record_for = |team: u32| records.iter().find(|r| r.team_id == team && r.week == week);
        let alive = self.alive();

        match self.rule {
            EliminationRule::LowestScore => {
                let scores: Vec<(u32, Decimal)> = alive
                    .iter()
                    .map(|team| {
                        let points = record_for(*team).map(|r| r.points_scored).unwrap_or_default();
                        (*team, points)
                    })
                    .collect();
                let Some(lowest) = scores.iter().map(|(_, p)| *p).min() else {
                    return Vec::new();
                };
                scores
                    .into_iter()
                    .filter(|(_, points)| *points == lowest)
                    .map(|(team_id, points)| Elimination {
                        week,
                        team_id,
                        points,
                    })
                    .collect()
            }
            EliminationRule::HeadToHeadLoss => alive
                .iter()
                .filter_map(|team| record_for(*team))
                .filter(|r| r.outcome == Outcome::Loss)
                .map(|r| Elimination {
                    week,
                    team_id: r.team_id,
                    points: r.points_scored,
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
