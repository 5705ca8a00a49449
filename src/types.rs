//! Shared types for the sidepots engine.
//!
//! These types form the data model used across all modules. Data-source
//! clients produce them, the sidepot engines consume them, and the report
//! formatter renders them. None of them carry I/O handles.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Decimal places kept for efficiency ratios.
pub const RATIO_DP: u32 = 6;

// ---------------------------------------------------------------------------
// Weekly results
// ---------------------------------------------------------------------------

/// Head-to-head result for one team in one week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Win,
    Loss,
    Tie,
    /// No opponent scheduled this week.
    Bye,
    /// The matchup has not been decided yet.
    Undecided,
}

/// One team's score for one week. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamWeekRecord {
    pub team_id: u32,
    pub week: u32,
    pub points_scored: Decimal,
    pub points_against: Decimal,
    pub opponent_id: Option<u32>,
    pub outcome: Outcome,
}

/// Declared winner of a matchup as reported by the league provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchupWinner {
    Home,
    Away,
    Tie,
    Undecided,
}

impl MatchupWinner {
    /// Parse the provider's winner marker (`HOME`, `AWAY`, `TIE`, anything
    /// else is undecided).
    pub fn from_marker(marker: &str) -> Self {
        match marker.trim().to_ascii_uppercase().as_str() {
            "HOME" => MatchupWinner::Home,
            "AWAY" => MatchupWinner::Away,
            "TIE" => MatchupWinner::Tie,
            _ => MatchupWinner::Undecided,
        }
    }

    pub fn is_decided(&self) -> bool {
        !matches!(self, MatchupWinner::Undecided)
    }
}

/// A scheduled head-to-head game for one week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matchup {
    pub week: u32,
    pub home_team_id: u32,
    pub home_points: Decimal,
    /// `None` when the home team has a bye.
    pub away_team_id: Option<u32>,
    pub away_points: Decimal,
    pub winner: MatchupWinner,
}

impl Matchup {
    /// Derive the per-team records for both sides of this matchup.
    pub fn team_records(&self) -> Vec<TeamWeekRecord> {
        let Some(away_id) = self.away_team_id else {
            return vec![TeamWeekRecord {
                team_id: self.home_team_id,
                week: self.week,
                points_scored: self.home_points,
                points_against: Decimal::ZERO,
                opponent_id: None,
                outcome: Outcome::Bye,
            }];
        };

        let (home_outcome, away_outcome) = match self.winner {
            MatchupWinner::Home => (Outcome::Win, Outcome::Loss),
            MatchupWinner::Away => (Outcome::Loss, Outcome::Win),
            MatchupWinner::Tie => (Outcome::Tie, Outcome::Tie),
            MatchupWinner::Undecided => (Outcome::Undecided, Outcome::Undecided),
        };

        vec![
            TeamWeekRecord {
                team_id: self.home_team_id,
                week: self.week,
                points_scored: self.home_points,
                points_against: self.away_points,
                opponent_id: Some(away_id),
                outcome: home_outcome,
            },
            TeamWeekRecord {
                team_id: away_id,
                week: self.week,
                points_scored: self.away_points,
                points_against: self.home_points,
                opponent_id: Some(self.home_team_id),
                outcome: away_outcome,
            },
        ]
    }
}

/// True when the week has at least one matchup and every matchup has a
/// decided winner.
pub fn is_week_complete(matchups: &[Matchup]) -> bool {
    !matchups.is_empty() && matchups.iter().all(|m| m.winner.is_decided())
}

/// Flatten a week's matchups into team records, sorted by team id.
pub fn records_from_matchups(matchups: &[Matchup]) -> Vec<TeamWeekRecord> {
    let mut records: Vec<TeamWeekRecord> =
        matchups.iter().flat_map(Matchup::team_records).collect();
    records.sort_by_key(|r| r.team_id);
    records.dedup_by_key(|r| r.team_id);
    records
}

// ---------------------------------------------------------------------------
// Lineup efficiency input
// ---------------------------------------------------------------------------

/// Actual vs. best-possible starting lineup points for one team-week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterProjection {
    pub team_id: u32,
    pub week: u32,
    pub actual_lineup_points: Decimal,
    /// Never below `actual_lineup_points`.
    pub optimal_lineup_points: Decimal,
}

impl RosterProjection {
    pub fn new(team_id: u32, week: u32, actual: Decimal, optimal: Decimal) -> Self {
        Self {
            team_id,
            week,
            actual_lineup_points: actual,
            optimal_lineup_points: optimal.max(actual),
        }
    }

    /// `actual / optimal` rounded to [`RATIO_DP`] places, in `(0, 1]`.
    ///
    /// Returns `None` when either side is not positive: the week carries
    /// no usable efficiency data for this team.
    pub fn efficiency(&self) -> Option<Decimal> {
        if self.optimal_lineup_points <= Decimal::ZERO
            || self.actual_lineup_points <= Decimal::ZERO
        {
            return None;
        }
        let ratio = self.actual_lineup_points / self.optimal_lineup_points;
        let ratio = ratio.round_dp_with_strategy(RATIO_DP, RoundingStrategy::MidpointNearestEven);
        // A positive ratio can round down to zero only for absurd inputs.
        (ratio > Decimal::ZERO).then_some(ratio.min(Decimal::ONE))
    }
}

// ---------------------------------------------------------------------------
// Standings
// ---------------------------------------------------------------------------

/// One ranked line of a sidepot's standings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingsRow {
    pub entity_id: u32,
    /// The value being ranked (points, ratio, wins).
    pub metric_value: Decimal,
    /// The secondary value used to break ties on `metric_value`.
    pub tiebreak_value: Decimal,
    /// 1-based.
    pub rank: u32,
}

/// Assign sequential 1-based ranks to rows that are already sorted.
pub fn rank_sorted(rows: Vec<(u32, Decimal, Decimal)>) -> Vec<StandingsRow> {
    rows.into_iter()
        .enumerate()
        .map(|(idx, (entity_id, metric_value, tiebreak_value))| StandingsRow {
            entity_id,
            metric_value,
            tiebreak_value,
            rank: idx as u32 + 1,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// League metadata
// ---------------------------------------------------------------------------

/// Human-readable team names keyed by team id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamLabels(BTreeMap<u32, String>);

impl TeamLabels {
    pub fn insert(&mut self, team_id: u32, label: impl Into<String>) {
        self.0.insert(team_id, label.into());
    }

    /// Label for a team, falling back to `Team {id}`.
    pub fn label_for(&self, team_id: u32) -> String {
        match self.0.get(&team_id) {
            Some(label) if !label.trim().is_empty() => label.clone(),
            _ => format!("Team {team_id}"),
        }
    }

    /// Known team ids, ascending.
    pub fn team_ids(&self) -> Vec<u32> {
        self.0.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// League-wide settings needed to resolve weeks and score lineups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeagueProfile {
    /// Number of regular-season scoring weeks.
    pub season_length: u32,
    /// The provider's current scoring period (0 before the season).
    pub current_scoring_period: u32,
    /// Starting lineup slot labels, one entry per slot (e.g. `RB` twice).
    pub lineup_slots: Vec<String>,
    pub labels: TeamLabels,
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// A single sidepot competition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Pir,
    Efficiency,
    Survivor,
}

impl Mode {
    pub const ALL: &'static [Mode] = &[Mode::Pir, Mode::Efficiency, Mode::Survivor];

    /// Report title used for this competition.
    pub fn title(&self) -> &'static str {
        match self {
            Mode::Pir => "Price Is Right",
            Mode::Efficiency => "Season Efficiency",
            Mode::Survivor => "Survivor Pool",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Pir => write!(f, "pir"),
            Mode::Efficiency => write!(f, "efficiency"),
            Mode::Survivor => write!(f, "survivor"),
        }
    }
}

/// The `--mode` selector: one competition or all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeSelection {
    All,
    Pir,
    Efficiency,
    Survivor,
}

impl ModeSelection {
    /// Modes to run, in the fixed processing order.
    pub fn modes(&self) -> Vec<Mode> {
        match self {
            ModeSelection::All => Mode::ALL.to_vec(),
            ModeSelection::Pir => vec![Mode::Pir],
            ModeSelection::Efficiency => vec![Mode::Efficiency],
            ModeSelection::Survivor => vec![Mode::Survivor],
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for sidepots.
#[derive(Debug, thiserror::Error)]
pub enum SidepotError {
    #[error("league provider rejected credentials (status {status}): {message}")]
    AuthRejected { status: u16, message: String },

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("malformed provider payload: {0}")]
    Decode(String),

    #[error("invalid week range '{spec}': {reason}")]
    InvalidWeekRange { spec: String, reason: String },

    #[error("week {week} is out of order: week {last_processed} was already processed")]
    OutOfOrderWeek { week: u32, last_processed: u32 },

    #[error("no Price Is Right target available for week {week}: {reason}")]
    MissingTarget { week: u32, reason: String },

    #[error("delivery failed for {mode}: {message}")]
    DeliveryFailure { mode: Mode, message: String },

    #[error("run lock error at {path}: {source}")]
    Lock {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl SidepotError {
    /// Whether a bounded retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SidepotError::TransientNetwork(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
