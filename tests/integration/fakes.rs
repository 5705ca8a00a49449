//! In-memory collaborators for integration testing.
//!
//! `FakeLeague` serves a fixed four-team season from memory and
//! `RecordingNotifier` captures every delivered report. Both can be told to
//! fail so error paths can be driven from test code.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use sidepots::data::LeagueDataSource;
use sidepots::notify::Notifier;
use sidepots::report::Report;
use sidepots::types::*;

/// A deterministic league: weeks 1-3 final, week 4 in progress.
pub struct FakeLeague {
    profile: LeagueProfile,
    matchups: BTreeMap<u32, Vec<Matchup>>,
    rosters: BTreeMap<u32, Vec<RosterProjection>>,
    /// HTTP status returned as `AuthRejected` by every roster fetch.
    roster_auth_failure: Mutex<Option<u16>>,
    profile_calls: AtomicUsize,
    score_calls: AtomicUsize,
}

fn matchup(week: u32, home: (u32, Decimal), away: (u32, Decimal), winner: MatchupWinner) -> Matchup {
    Matchup {
        week,
        home_team_id: home.0,
        home_points: home.1,
        away_team_id: Some(away.0),
        away_points: away.1,
        winner,
    }
}

impl FakeLeague {
    pub fn new() -> Self {
        let mut labels = TeamLabels::default();
        labels.insert(1, "Alpha");
        labels.insert(2, "Bravo");
        labels.insert(3, "Charlie");
        labels.insert(4, "Delta");

        let mut matchups = BTreeMap::new();
        matchups.insert(
            1,
            vec![
                matchup(1, (1, dec!(151.20)), (2, dec!(120.00)), MatchupWinner::Home),
                matchup(1, (3, dec!(149.50)), (4, dec!(98.00)), MatchupWinner::Home),
            ],
        );
        matchups.insert(
            2,
            vec![
                matchup(2, (1, dec!(130.00)), (3, dec!(140.00)), MatchupWinner::Away),
                matchup(2, (2, dec!(110.00)), (4, dec!(105.00)), MatchupWinner::Home),
            ],
        );
        matchups.insert(
            3,
            vec![
                matchup(3, (1, dec!(150.00)), (4, dec!(90.00)), MatchupWinner::Home),
                matchup(3, (2, dec!(100.00)), (3, dec!(145.00)), MatchupWinner::Away),
            ],
        );
        matchups.insert(
            4,
            vec![
                matchup(4, (1, dec!(60.00)), (2, dec!(45.00)), MatchupWinner::Undecided),
                matchup(4, (3, dec!(70.00)), (4, dec!(20.00)), MatchupWinner::Undecided),
            ],
        );

        // Alpha sets a perfect lineup every week; the others leave points
        // on the bench.
        let mut rosters = BTreeMap::new();
        for week in 1..=4 {
            rosters.insert(
                week,
                vec![
                    RosterProjection::new(1, week, dec!(100), dec!(100)),
                    RosterProjection::new(2, week, dec!(90), dec!(100)),
                    RosterProjection::new(3, week, dec!(120), dec!(150)),
                    RosterProjection::new(4, week, dec!(80), dec!(100)),
                ],
            );
        }

        Self {
            profile: LeagueProfile {
                season_length: 14,
                current_scoring_period: 4,
                lineup_slots: vec!["QB".into(), "RB".into(), "RB".into(), "WR".into()],
                labels,
            },
            matchups,
            rosters,
            roster_auth_failure: Mutex::new(None),
            profile_calls: AtomicUsize::new(0),
            score_calls: AtomicUsize::new(0),
        }
    }

    /// Make every roster fetch fail with the given status.
    pub fn reject_rosters(&self, status: u16) {
        *self.roster_auth_failure.lock().unwrap() = Some(status);
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    pub fn score_calls(&self) -> usize {
        self.score_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LeagueDataSource for FakeLeague {
    async fn fetch_league_profile(&self) -> Result<LeagueProfile, SidepotError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.profile.clone())
    }

    async fn fetch_matchups(&self, week: u32) -> Result<Vec<Matchup>, SidepotError> {
        Ok(self.matchups.get(&week).cloned().unwrap_or_default())
    }

    async fn fetch_week_scores(&self, week: u32) -> Result<Vec<TeamWeekRecord>, SidepotError> {
        self.score_calls.fetch_add(1, Ordering::SeqCst);
        let matchups = self.matchups.get(&week).cloned().unwrap_or_default();
        Ok(records_from_matchups(&matchups))
    }

    async fn fetch_rosters_with_projections(&self, week: u32) -> Result<Vec<RosterProjection>, SidepotError> {
        if let Some(status) = *self.roster_auth_failure.lock().unwrap() {
            return Err(SidepotError::AuthRejected {
                status,
                message: "cookie expired".into(),
            });
        }
        Ok(self.rosters.get(&week).cloned().unwrap_or_default())
    }
}

/// Captures delivered reports. Endpoints listed in `reject` fail.
#[derive(Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<(String, Report)>>,
    reject: Mutex<HashSet<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_endpoint(&self, endpoint: &str) {
        self.reject.lock().unwrap().insert(endpoint.to_string());
    }

    pub fn delivered(&self) -> Vec<(String, Report)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn report_for(&self, mode: Mode) -> Option<Report> {
        self.delivered()
            .into_iter()
            .map(|(_, report)| report)
            .find(|report| report.mode == mode)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, endpoint: &str, report: &Report) -> Result<(), SidepotError> {
        if self.reject.lock().unwrap().contains(endpoint) {
            return Err(SidepotError::DeliveryFailure {
                mode: report.mode,
                message: "HTTP 404 Not Found: Unknown Webhook".into(),
            });
        }
        self.delivered
            .lock()
            .unwrap()
            .push((endpoint.to_string(), report.clone()));
        Ok(())
    }
}
