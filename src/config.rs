//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config/league.toml` and deserializes into strongly-typed structs.
//! Environment values always win over the file, so credentials can be
//! injected per environment. Overrides are read through a lookup function
//! so tests never touch the process environment.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::engine::orchestrator::RunSettings;
use crate::guard::{DEFAULT_LOCK_PATH, DEFAULT_STALE_AFTER_SECS};
use crate::retry::RetryPolicy;
use crate::sidepots::pir::{TargetRule, DEFAULT_PRECISION_DP, DEFAULT_TARGET};
use crate::sidepots::survivor::EliminationRule;
use crate::types::Mode;

/// Top-level application configuration.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub league: LeagueConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub pir: PirConfig,
    pub survivor: SurvivorConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeagueConfig {
    #[serde(default)]
    pub league_id: u64,
    #[serde(default)]
    pub season: u16,
    /// Overrides the provider's regular-season length.
    #[serde(default)]
    pub regular_season_weeks: Option<u32>,
    #[serde(default)]
    pub espn_s2: Option<SecretString>,
    /// Must be wrapped in braces; normalized on load.
    #[serde(default)]
    pub swid: Option<SecretString>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_lock_path")]
    pub lock_path: String,
    #[serde(default = "default_lock_stale_secs")]
    pub lock_stale_secs: u64,
    /// When week 1 scoring becomes final, as an RFC 3339 string.
    #[serde(default)]
    pub week1_finalized_at: Option<DateTime<Utc>>,
}

/// Upper bound on `run.lock_stale_secs`: one week.
pub const MAX_LOCK_STALE_SECS: u64 = 7 * 24 * 60 * 60;

impl RunConfig {
    /// Staleness window for the run lock, capped at [`MAX_LOCK_STALE_SECS`].
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lock_stale_secs.min(MAX_LOCK_STALE_SECS) as i64)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            lock_path: default_lock_path(),
            lock_stale_secs: default_lock_stale_secs(),
            week1_finalized_at: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Try the `lm-api-reads` host before the main one.
    #[serde(default)]
    pub prefer_alt_host: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            prefer_alt_host: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PirConfig {
    #[serde(default = "default_pir_target")]
    pub target: Decimal,
    /// Per-week target overrides keyed by week number.
    #[serde(default)]
    pub week_targets: BTreeMap<String, Decimal>,
    /// Two team ids whose combined score sets the target.
    #[serde(default)]
    pub target_teams: Option<Vec<u32>>,
    #[serde(default = "default_precision_dp")]
    pub precision_dp: u32,
}

impl Default for PirConfig {
    fn default() -> Self {
        Self {
            target: default_pir_target(),
            week_targets: BTreeMap::new(),
            target_teams: None,
            precision_dp: default_precision_dp(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurvivorConfig {
    /// Required: `lowest_score` or `head_to_head_loss`.
    pub rule: EliminationRule,
    #[serde(default = "default_start_week")]
    pub start_week: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub pir: Option<String>,
    #[serde(default)]
    pub efficiency: Option<String>,
    #[serde(default)]
    pub survivor: Option<String>,
}

impl WebhookConfig {
    /// Endpoint for a mode; blank values count as unset.
    pub fn endpoint_for(&self, mode: Mode) -> Option<&str> {
        let url = match mode {
            Mode::Pir => &self.pir,
            Mode::Efficiency => &self.efficiency,
            Mode::Survivor => &self.survivor,
        };
        url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

fn default_lock_path() -> String {
    DEFAULT_LOCK_PATH.to_string()
}
fn default_lock_stale_secs() -> u64 {
    DEFAULT_STALE_AFTER_SECS.unsigned_abs()
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    600
}
fn default_max_delay_ms() -> u64 {
    5_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_pir_target() -> Decimal {
    DEFAULT_TARGET
}
fn default_precision_dp() -> u32 {
    DEFAULT_PRECISION_DP
}
fn default_start_week() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load from a TOML file, apply process environment overrides, validate.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    pub fn load_with<F>(path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_with(&contents, lookup)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml_with<F>(contents: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: AppConfig =
            toml::from_str(contents).context("Failed to parse config TOML")?;
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Environment values replace file values when present and non-empty.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(raw) = get("LEAGUE_ID") {
            match raw.parse() {
                Ok(id) => self.league.league_id = id,
                Err(_) => warn!(value = %raw, "Ignoring invalid LEAGUE_ID override"),
            }
        }
        if let Some(raw) = get("SEASON") {
            match raw.parse() {
                Ok(season) => self.league.season = season,
                Err(_) => warn!(value = %raw, "Ignoring invalid SEASON override"),
            }
        }
        if let Some(s2) = get("ESPN_S2") {
            self.league.espn_s2 = Some(SecretString::new(s2));
        }
        if let Some(swid) = get("SWID") {
            self.league.swid = Some(SecretString::new(swid));
        }
        if let Some(url) = get("WEBHOOK_PIR") {
            self.webhooks.pir = Some(url);
        }
        if let Some(url) = get("WEBHOOK_EFFICIENCY") {
            self.webhooks.efficiency = Some(url);
        }
        if let Some(url) = get("WEBHOOK_SURVIVOR") {
            self.webhooks.survivor = Some(url);
        }
        if let Some(path) = get("SIDEPOTS_LOCK_PATH") {
            self.run.lock_path = path;
        }

        self.league.swid = self
            .league
            .swid
            .take()
            .map(|swid| SecretString::new(normalize_swid(swid.expose_secret())));
        self.league.espn_s2 = self
            .league
            .espn_s2
            .take()
            .filter(|s2| !s2.expose_secret().trim().is_empty());
    }

    pub fn validate(&self) -> Result<()> {
        if self.league.league_id == 0 {
            bail!("league.league_id is required (or set LEAGUE_ID)");
        }
        if self.league.season == 0 {
            bail!("league.season is required (or set SEASON)");
        }
        if self.league.espn_s2.is_some() != self.league.swid.is_some() {
            bail!("espn_s2 and swid must be provided together");
        }
        if self.http.timeout_secs == 0 {
            bail!("http.timeout_secs must be positive");
        }
        if self.run.lock_stale_secs == 0 {
            bail!("run.lock_stale_secs must be positive");
        }
        if self.run.lock_stale_secs > MAX_LOCK_STALE_SECS {
            bail!("run.lock_stale_secs must be at most {MAX_LOCK_STALE_SECS}");
        }
        if self.survivor.start_week == 0 {
            bail!("survivor.start_week must be at least 1");
        }
        if self.pir.precision_dp > 6 {
            bail!("pir.precision_dp must be at most 6");
        }
        if self.pir.target <= Decimal::ZERO {
            bail!("pir.target must be positive");
        }
        if let Some(teams) = &self.pir.target_teams {
            if teams.len() != 2 {
                bail!("pir.target_teams must name exactly two teams");
            }
        }
        self.week_targets()?;
        Ok(())
    }

    fn week_targets(&self) -> Result<BTreeMap<u32, Decimal>> {
        self.pir
            .week_targets
            .iter()
            .map(|(week, target)| {
                let week: u32 = week
                    .trim()
                    .parse()
                    .with_context(|| format!("pir.week_targets key '{week}' is not a week number"))?;
                Ok((week, *target))
            })
            .collect()
    }

    /// The immutable settings threaded through one run.
    pub fn run_settings(&self) -> Result<RunSettings> {
        let target_teams = match self.pir.target_teams.as_deref() {
            Some([a, b]) => Some((*a, *b)),
            _ => None,
        };
        Ok(RunSettings {
            target_rule: TargetRule {
                default_target: self.pir.target,
                week_targets: self.week_targets()?,
                target_teams,
                precision_dp: self.pir.precision_dp,
            },
            survivor_rule: self.survivor.rule,
            survivor_start_week: self.survivor.start_week,
            regular_season_weeks: self.league.regular_season_weeks,
            week1_finalized_at: self.run.week1_finalized_at,
            retry: self.retry.policy(),
        })
    }

    /// Log the effective configuration with credentials masked.
    pub fn log_summary(&self) {
        let masked = |s: &Option<SecretString>| {
            s.as_ref()
                .map(|v| mask_secret(v.expose_secret()))
                .unwrap_or_else(|| "<none>".to_string())
        };
        info!(
            league_id = self.league.league_id,
            season = self.league.season,
            espn_s2 = %masked(&self.league.espn_s2),
            swid = %masked(&self.league.swid),
            survivor_rule = %self.survivor.rule,
            lock_path = %self.run.lock_path,
            "Configuration loaded"
        );
    }
}

/// Wrap a SWID cookie in braces if it is not already.
pub fn normalize_swid(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('{').trim_end_matches('}');
    format!("{{{trimmed}}}")
}

/// `*...` followed by the last six characters.
pub fn mask_secret(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = value.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(6)..].iter().collect();
    format!("*...{tail}")
}
