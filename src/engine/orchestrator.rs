//! Run orchestrator.
//!
//! One invocation: fetch the league profile, resolve the weeks, then run
//! each requested competition in turn. A failing competition is recorded
//! and the next one still runs; the summary's exit code reflects whether
//! anything failed.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use super::dispatch::Dispatcher;
use crate::data::LeagueDataSource;
use crate::report::{format_efficiency, format_pir, format_survivor, Report, WeekRange};
use crate::retry::RetryPolicy;
use crate::schedule::{last_completed_week, resolve, SeasonSchedule, WeekSpec};
use crate::sidepots::pir::evaluate_week;
use crate::sidepots::{EfficiencySeason, EliminationRule, PirSeason, SurvivorPool, TargetRule};
use crate::types::{LeagueProfile, Mode, ModeSelection, SidepotError, TeamWeekRecord};

// ---------------------------------------------------------------------------
// Settings and results
// ---------------------------------------------------------------------------

/// Immutable per-run settings threaded through the engines.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub target_rule: TargetRule,
    pub survivor_rule: EliminationRule,
    pub survivor_start_week: u32,
    /// Overrides the provider's season length when set.
    pub regular_season_weeks: Option<u32>,
    pub week1_finalized_at: Option<DateTime<Utc>>,
    pub retry: RetryPolicy,
}

/// How one competition ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeStatus {
    Delivered,
    /// Computed and printed; nothing was sent.
    DryRun,
    /// No weeks to process.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModeResult {
    pub mode: Mode,
    pub status: ModeStatus,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub weeks: Vec<u32>,
    pub results: Vec<ModeResult>,
}

impl RunSummary {
    fn uniform(run_id: Uuid, weeks: Vec<u32>, modes: &[Mode], status: ModeStatus) -> Self {
        Self {
            run_id,
            weeks,
            results: modes
                .iter()
                .map(|mode| ModeResult {
                    mode: *mode,
                    status: status.clone(),
                })
                .collect(),
        }
    }

    pub fn status_of(&self, mode: Mode) -> Option<&ModeStatus> {
        self.results.iter().find(|r| r.mode == mode).map(|r| &r.status)
    }

    pub fn failed(&self) -> Vec<&ModeResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, ModeStatus::Failed(_)))
            .collect()
    }

    /// 0 unless at least one mode failed.
    pub fn exit_code(&self) -> u8 {
        if self.failed().is_empty() {
            0
        } else {
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    source: Arc<dyn LeagueDataSource>,
    dispatcher: Dispatcher,
    settings: RunSettings,
}

impl Orchestrator {
    pub fn new(source: Arc<dyn LeagueDataSource>, dispatcher: Dispatcher, settings: RunSettings) -> Self {
        Self {
            source,
            dispatcher,
            settings,
        }
    }

    pub async fn run(&self, selection: ModeSelection, spec: &WeekSpec, now: DateTime<Utc>) -> RunSummary {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "run",
            %run_id,
            selection = ?selection,
            weeks = %spec,
            dry_run = self.dispatcher.is_dry_run()
        );
        self.run_modes(run_id, &selection.modes(), spec, now)
            .instrument(span)
            .await
    }

    async fn run_modes(&self, run_id: Uuid, modes: &[Mode], spec: &WeekSpec, now: DateTime<Utc>) -> RunSummary {
        info!("Starting run");

        let (profile, weeks) = match self.prepare(spec, now).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(error = %e, "Could not resolve weeks, failing every mode");
                return RunSummary::uniform(run_id, Vec::new(), modes, ModeStatus::Failed(e.to_string()));
            }
        };

        if weeks.is_empty() {
            info!("No completed weeks to process");
            return RunSummary::uniform(run_id, weeks, modes, ModeStatus::Skipped);
        }

        let mut cache = WeekCache::default();
        let mut results = Vec::with_capacity(modes.len());
        for mode in modes {
            info!(mode = %mode, weeks = ?weeks, "Running sidepot");
            let status = match self.run_mode(*mode, &weeks, &profile, &mut cache).await {
                Ok(status) => status,
                Err(e) => {
                    error!(mode = %mode, error = %e, "Sidepot failed");
                    ModeStatus::Failed(e.to_string())
                }
            };
            results.push(ModeResult { mode: *mode, status });
        }

        let summary = RunSummary { run_id, weeks, results };
        info!(
            failed = summary.failed().len(),
            exit_code = summary.exit_code(),
            "Run complete"
        );
        summary
    }

    /// Fetch the league profile and resolve the week selector.
    async fn prepare(&self, spec: &WeekSpec, now: DateTime<Utc>) -> Result<(LeagueProfile, Vec<u32>), SidepotError> {
        let source = self.source.as_ref();
        let retry = &self.settings.retry;

        let mut profile = retry
            .run("fetch_league_profile", move || source.fetch_league_profile())
            .await?;

        if let Some(weeks) = self.settings.regular_season_weeks.filter(|w| *w > 0) {
            profile.season_length = weeks;
        }
        if profile.season_length == 0 {
            return Err(SidepotError::Config(
                "season length unknown; set league.regular_season_weeks".into(),
            ));
        }

        let mut schedule =
            SeasonSchedule::new(profile.season_length).with_finalization(self.settings.week1_finalized_at);
        if *spec == WeekSpec::Auto {
            let completed = last_completed_week(source, &profile, retry).await?;
            schedule = schedule.with_provider_completed(completed);
        }

        let weeks = resolve(spec, &schedule, now)?;
        Ok((profile, weeks))
    }

    async fn run_mode(
        &self,
        mode: Mode,
        weeks: &[u32],
        profile: &LeagueProfile,
        cache: &mut WeekCache,
    ) -> Result<ModeStatus, SidepotError> {
        let report = match mode {
            Mode::Pir => self.price_is_right(weeks, profile, cache).await?,
            Mode::Efficiency => self.efficiency(weeks, profile).await?,
            Mode::Survivor => self.survivor(weeks, profile, cache).await?,
        };
        self.dispatcher.dispatch(&report).await
    }

    async fn price_is_right(
        &self,
        weeks: &[u32],
        profile: &LeagueProfile,
        cache: &mut WeekCache,
    ) -> Result<Report, SidepotError> {
        let mut season = PirSeason::new();
        for &week in weeks {
            let records = cache.scores(self.source.as_ref(), &self.settings.retry, week).await?;
            let target = self.settings.target_rule.target_for(week, records)?;
            season.add_week(evaluate_week(week, &target, records));
        }
        Ok(format_pir(&season, &WeekRange::new(weeks), &profile.labels))
    }

    async fn efficiency(&self, weeks: &[u32], profile: &LeagueProfile) -> Result<Report, SidepotError> {
        let source = self.source.as_ref();
        let mut season = EfficiencySeason::new();
        for &week in weeks {
            let projections = self
                .settings
                .retry
                .run("fetch_rosters_with_projections", move || {
                    source.fetch_rosters_with_projections(week)
                })
                .await?;
            let ranked = season.add_week(week, &projections);
            debug!(
                week,
                teams = ranked.len(),
                leader = ?ranked.first().map(|row| row.entity_id),
                "Ranked efficiency week"
            );
        }
        Ok(format_efficiency(&season, &WeekRange::new(weeks), &profile.labels))
    }

    async fn survivor(
        &self,
        weeks: &[u32],
        profile: &LeagueProfile,
        cache: &mut WeekCache,
    ) -> Result<Report, SidepotError> {
        let mut entrants = profile.labels.team_ids();
        if entrants.is_empty() {
            if let Some(&first) = weeks.first() {
                let records = cache.scores(self.source.as_ref(), &self.settings.retry, first).await?;
                entrants = records.iter().map(|r| r.team_id).collect();
            }
        }

        let mut pool = SurvivorPool::new(self.settings.survivor_rule, self.settings.survivor_start_week, entrants);
        for &week in weeks {
            if pool.is_concluded() {
                debug!(week, "Survivor pool decided, remaining weeks not evaluated");
                break;
            }
            let records = cache.scores(self.source.as_ref(), &self.settings.retry, week).await?;
            pool.process_week(week, records)?;
        }
        Ok(format_survivor(&pool, &WeekRange::new(weeks), &profile.labels))
    }
}

/// Week scores fetched during this run, shared across modes.
#[derive(Default)]
struct WeekCache {
    scores: HashMap<u32, Vec<TeamWeekRecord>>,
}

impl WeekCache {
    async fn scores(
        &mut self,
        source: &dyn LeagueDataSource,
        retry: &RetryPolicy,
        week: u32,
    ) -> Result<&[TeamWeekRecord], SidepotError> {
        if !self.scores.contains_key(&week) {
            let records = retry
                .run("fetch_week_scores", move || source.fetch_week_scores(week))
                .await?;
            self.scores.insert(week, records);
        }
        Ok(self.scores.get(&week).map(Vec::as_slice).unwrap_or(&[]))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
