//! Week resolution.
//!
//! Turns the `--weeks` selector into a concrete, ascending list of scoring
//! weeks, and works out how many weeks of the season are final.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::data::LeagueDataSource;
use crate::retry::RetryPolicy;
use crate::types::{is_week_complete, LeagueProfile, SidepotError};

// ---------------------------------------------------------------------------
// Week selector
// ---------------------------------------------------------------------------

/// Parsed `--weeks` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeekSpec {
    /// Every week final so far.
    Auto,
    Single(u32),
    /// Inclusive range.
    Range(u32, u32),
    List(Vec<u32>),
}

impl WeekSpec {
    fn invalid(spec: &str, reason: impl Into<String>) -> SidepotError {
        SidepotError::InvalidWeekRange {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }

    fn parse_week(spec: &str, raw: &str) -> Result<u32, SidepotError> {
        raw.trim()
            .parse::<u32>()
            .map_err(|_| Self::invalid(spec, format!("'{}' is not a week number", raw.trim())))
    }
}

impl FromStr for WeekSpec {
    type Err = SidepotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim().to_lowercase();
        if spec.is_empty() {
            return Err(Self::invalid(s, "empty week selector"));
        }
        if spec == "auto" {
            return Ok(WeekSpec::Auto);
        }
        if spec.contains(',') {
            let weeks = spec
                .split(',')
                .filter(|part| !part.trim().is_empty())
                .map(|part| Self::parse_week(s, part))
                .collect::<Result<Vec<_>, _>>()?;
            if weeks.is_empty() {
                return Err(Self::invalid(s, "empty week list"));
            }
            return Ok(WeekSpec::List(weeks));
        }
        if let Some((start, end)) = spec.split_once('-') {
            let start = Self::parse_week(s, start)?;
            let end = Self::parse_week(s, end)?;
            return Ok(WeekSpec::Range(start, end));
        }
        Ok(WeekSpec::Single(Self::parse_week(s, &spec)?))
    }
}

impl fmt::Display for WeekSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeekSpec::Auto => write!(f, "auto"),
            WeekSpec::Single(w) => write!(f, "{w}"),
            WeekSpec::Range(a, b) => write!(f, "{a}-{b}"),
            WeekSpec::List(weeks) => {
                let parts: Vec<String> = weeks.iter().map(u32::to_string).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Season schedule
// ---------------------------------------------------------------------------

/// What is known about the season's progress at resolution time.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonSchedule {
    pub season_length: u32,
    /// When week 1 scoring becomes final; each later week finalizes seven
    /// days after the previous one.
    pub week1_finalized_at: Option<DateTime<Utc>>,
    /// Last consecutive week the provider reports as decided.
    pub provider_completed: Option<u32>,
}

impl SeasonSchedule {
    pub fn new(season_length: u32) -> Self {
        Self {
            season_length,
            week1_finalized_at: None,
            provider_completed: None,
        }
    }

    pub fn with_finalization(mut self, week1_finalized_at: Option<DateTime<Utc>>) -> Self {
        self.week1_finalized_at = week1_finalized_at;
        self
    }

    pub fn with_provider_completed(mut self, completed: u32) -> Self {
        self.provider_completed = Some(completed);
        self
    }

    /// Number of weeks whose scoring is final at `now`, capped by the
    /// season length.
    pub fn completed_through(&self, now: DateTime<Utc>) -> u32 {
        let by_clock = self.week1_finalized_at.map(|anchor| {
            if now < anchor {
                0
            } else {
                let elapsed_weeks = (now - anchor).num_seconds() / Duration::weeks(1).num_seconds();
                u32::try_from(elapsed_weeks + 1).unwrap_or(u32::MAX)
            }
        });

        let completed = match (by_clock, self.provider_completed) {
            (Some(clock), Some(provider)) => clock.min(provider),
            (Some(clock), None) => clock,
            (None, Some(provider)) => provider,
            (None, None) => 0,
        };
        completed.min(self.season_length)
    }

    fn check(&self, spec: &WeekSpec, week: u32) -> Result<u32, SidepotError> {
        if week == 0 || week > self.season_length {
            return Err(WeekSpec::invalid(
                &spec.to_string(),
                format!("week {week} is outside 1..={}", self.season_length),
            ));
        }
        Ok(week)
    }
}

/// Resolve a selector into ascending, duplicate-free week numbers.
pub fn resolve(
    spec: &WeekSpec,
    schedule: &SeasonSchedule,
    now: DateTime<Utc>,
) -> Result<Vec<u32>, SidepotError> {
    let weeks: Vec<u32> = match spec {
        WeekSpec::Auto => (1..=schedule.completed_through(now)).collect(),
        WeekSpec::Single(week) => vec![schedule.check(spec, *week)?],
        WeekSpec::Range(start, end) => {
            if start > end {
                return Err(WeekSpec::invalid(
                    &spec.to_string(),
                    format!("start week {start} is after end week {end}"),
                ));
            }
            let start = schedule.check(spec, *start)?;
            let end = schedule.check(spec, *end)?;
            (start..=end).collect()
        }
        WeekSpec::List(list) => {
            let mut unique = BTreeSet::new();
            for week in list {
                unique.insert(schedule.check(spec, *week)?);
            }
            unique.into_iter().collect()
        }
    };

    debug!(spec = %spec, weeks = ?weeks, "Resolved weeks");
    Ok(weeks)
}

/// Last consecutive week, starting from week 1, whose matchups all have a
/// decided winner. Returns 0 when week 1 is not final yet.
pub async fn last_completed_week(
    source: &dyn LeagueDataSource,
    profile: &LeagueProfile,
    retry: &RetryPolicy,
) -> Result<u32, SidepotError> {
    let upper = if profile.current_scoring_period > 0 {
        profile.current_scoring_period.min(profile.season_length)
    } else {
        profile.season_length
    };

    let mut last_complete = 0;
    for week in 1..=upper {
        let matchups = retry
            .run("fetch_matchups", move || source.fetch_matchups(week))
            .await?;
        if !is_week_complete(&matchups) {
            break;
        }
        last_complete = week;
    }

    debug!(last_complete, upper, "Scanned matchups for completion");
    Ok(last_complete)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
