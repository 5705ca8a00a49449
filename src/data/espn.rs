//! ESPN fantasy football league client.
//!
//! Reads league settings, matchups and weekly rosters from the ESPN v3
//! league API. Private leagues authenticate with two browser cookies:
//! `espn_s2` and `SWID` (the latter wrapped in braces).
//!
//! API: `https://fantasy.espn.com/apis/v3/games/ffl/seasons/{season}/segments/0/leagues/{league_id}`
//! with `view=` selectors (`mSettings`, `mTeam`, `mMatchup`, `mRoster`).
//! The `lm-api-reads` host serves the same API and is used as a fallback
//! when the primary host answers with an HTML bot-protection page.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, REFERER};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::lineup::{self, RosterSlotEntry};
use super::LeagueDataSource;
use crate::config::{HttpConfig, LeagueConfig};
use crate::types::{
    records_from_matchups, LeagueProfile, Matchup, MatchupWinner, RosterProjection, SidepotError,
    TeamLabels, TeamWeekRecord,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const PRIMARY_HOST: &str = "https://fantasy.espn.com";
const ALT_HOST: &str = "https://lm-api-reads.fantasy.espn.com";

/// Desktop browser agent; the API serves bot pages to unknown agents.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Characters of a failed response body kept for error messages.
const BODY_SNIPPET_LEN: usize = 200;

/// ESPN lineup slot ids.
fn slot_label(slot_id: u32) -> &'static str {
    match slot_id {
        0 => "QB",
        1 => "TQB",
        2 => "RB",
        3 => "RB/WR",
        4 => "WR",
        5 => "WR/TE",
        6 => "TE",
        7 => "OP",
        8 => "DT",
        9 => "DE",
        10 => "LB",
        11 => "DL",
        12 => "CB",
        13 => "S",
        14 => "DB",
        15 => "DP",
        16 => "D/ST",
        17 => "K",
        18 => "P",
        19 => "HC",
        20 => "BE",
        21 => "IR",
        23 => "RB/WR/TE",
        24 => "ER",
        _ => "",
    }
}

/// ESPN default position ids (differ from slot ids).
fn position_label(position_id: u32) -> &'static str {
    match position_id {
        1 => "QB",
        2 => "RB",
        3 => "WR",
        4 => "TE",
        5 => "K",
        16 => "D/ST",
        _ => "",
    }
}

// ---------------------------------------------------------------------------
// API response types (ESPN JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeaguePayload {
    #[serde(default)]
    settings: Option<SettingsBlock>,
    #[serde(default)]
    status: Option<StatusBlock>,
    #[serde(default)]
    members: Vec<MemberPayload>,
    #[serde(default)]
    teams: Vec<TeamPayload>,
    #[serde(default)]
    schedule: Vec<ScheduleEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsBlock {
    #[serde(default)]
    schedule_settings: Option<ScheduleSettings>,
    #[serde(default)]
    roster_settings: Option<RosterSettings>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleSettings {
    #[serde(default)]
    matchup_period_count: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RosterSettings {
    /// Keyed by slot id as a string.
    #[serde(default)]
    lineup_slot_counts: HashMap<String, u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusBlock {
    #[serde(default)]
    current_matchup_period: u32,
    #[serde(default)]
    latest_scoring_period: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberPayload {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamPayload {
    id: u32,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    owners: Vec<String>,
    #[serde(default)]
    primary_owner: Option<String>,
    #[serde(default)]
    roster: Option<RosterPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct RosterPayload {
    #[serde(default)]
    entries: Vec<RosterEntryPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RosterEntryPayload {
    #[serde(default)]
    lineup_slot_id: u32,
    #[serde(default)]
    player_pool_entry: Option<PlayerPoolEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerPoolEntry {
    /// Points for the requested scoring period, when present.
    #[serde(default)]
    applied_stat_total: Option<Decimal>,
    #[serde(default)]
    player: Option<PlayerPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerPayload {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    default_position_id: u32,
    #[serde(default)]
    eligible_slots: Vec<u32>,
    #[serde(default)]
    stats: Vec<StatPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatPayload {
    #[serde(default)]
    scoring_period_id: u32,
    /// 0 = actual, 1 = projected.
    #[serde(default)]
    stat_source_id: u32,
    #[serde(default)]
    applied_total: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleEntry {
    #[serde(default)]
    matchup_period_id: u32,
    #[serde(default)]
    winner: Option<String>,
    #[serde(default)]
    home: Option<SidePayload>,
    #[serde(default)]
    away: Option<SidePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SidePayload {
    team_id: u32,
    #[serde(default)]
    total_points: Option<Decimal>,
    #[serde(default)]
    total_points_live: Option<Decimal>,
}

impl SidePayload {
    fn points(&self) -> Decimal {
        self.total_points
            .or(self.total_points_live)
            .unwrap_or(Decimal::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Payload → domain
// ---------------------------------------------------------------------------

/// `member id → display name`, preferring display name, then full name.
fn member_names(members: &[MemberPayload]) -> HashMap<String, String> {
    let clean = |s: &Option<String>| s.as_deref().map(str::trim).unwrap_or("").to_string();
    members
        .iter()
        .filter_map(|m| {
            let id = clean(&m.id);
            if id.is_empty() {
                return None;
            }
            let display = clean(&m.display_name);
            let full = format!("{} {}", clean(&m.first_name), clean(&m.last_name))
                .trim()
                .to_string();
            let name = if !display.is_empty() {
                display
            } else if !full.is_empty() {
                full
            } else {
                id.chars().take(6).collect::<String>().to_uppercase()
            };
            Some((id, name))
        })
        .collect()
}

/// `Location Nickname (Owner)`, falling back to the single team name.
fn team_labels(teams: &[TeamPayload], members: &[MemberPayload]) -> TeamLabels {
    let names = member_names(members);
    let mut labels = TeamLabels::default();
    for team in teams {
        let location = team.location.as_deref().unwrap_or("").trim();
        let nickname = team.nickname.as_deref().unwrap_or("").trim();
        let base = if !location.is_empty() || !nickname.is_empty() {
            format!("{location} {nickname}").trim().to_string()
        } else {
            match team.name.as_deref().map(str::trim) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => format!("Team {}", team.id),
            }
        };

        let owner = team
            .owners
            .first()
            .or(team.primary_owner.as_ref())
            .and_then(|id| names.get(id));
        let label = match owner {
            Some(owner) => format!("{base} ({owner})"),
            None => base,
        };
        labels.insert(team.id, label);
    }
    labels
}

fn lineup_slots(settings: Option<&SettingsBlock>) -> Vec<String> {
    let counts = settings
        .and_then(|s| s.roster_settings.as_ref())
        .map(|r| &r.lineup_slot_counts);
    let Some(counts) = counts else {
        return Vec::new();
    };

    let mut by_label: BTreeMap<String, u32> = BTreeMap::new();
    for (slot_id, count) in counts {
        let label = slot_id.parse::<u32>().map(slot_label).unwrap_or("");
        if label.is_empty() || *count == 0 {
            continue;
        }
        *by_label.entry(label.to_string()).or_default() += count;
    }
    lineup::expand_slot_counts(&by_label)
}

fn profile_from_payload(payload: &LeaguePayload) -> LeagueProfile {
    let settings = payload.settings.as_ref();
    let season_length = settings
        .and_then(|s| s.schedule_settings.as_ref())
        .map(|s| s.matchup_period_count)
        .unwrap_or(0);
    let current = payload
        .status
        .as_ref()
        .map(|s| s.current_matchup_period.max(s.latest_scoring_period))
        .unwrap_or(0);

    LeagueProfile {
        season_length,
        current_scoring_period: current,
        lineup_slots: lineup_slots(settings),
        labels: team_labels(&payload.teams, &payload.members),
    }
}

fn matchups_from_payload(week: u32, payload: &LeaguePayload) -> Vec<Matchup> {
    payload
        .schedule
        .iter()
        .filter(|entry| entry.matchup_period_id == week)
        .filter_map(|entry| {
            let home = entry.home.as_ref()?;
            Some(Matchup {
                week,
                home_team_id: home.team_id,
                home_points: home.points(),
                away_team_id: entry.away.as_ref().map(|a| a.team_id),
                away_points: entry.away.as_ref().map(SidePayload::points).unwrap_or(Decimal::ZERO),
                winner: MatchupWinner::from_marker(entry.winner.as_deref().unwrap_or("")),
            })
        })
        .collect()
}

/// Player points for a week: the period total when the API supplies it,
/// otherwise the actual (not projected) stat line for that period.
fn player_points(entry: &PlayerPoolEntry, week: u32) -> Decimal {
    if let Some(total) = entry.applied_stat_total {
        return total;
    }
    entry
        .player
        .as_ref()
        .and_then(|p| {
            p.stats
                .iter()
                .filter(|s| s.scoring_period_id == week && s.stat_source_id == 0)
                .find_map(|s| s.applied_total)
        })
        .unwrap_or(Decimal::ZERO)
}

fn roster_entries(team: &TeamPayload, week: u32) -> Vec<RosterSlotEntry> {
    let Some(roster) = team.roster.as_ref() else {
        return Vec::new();
    };
    roster
        .entries
        .iter()
        .filter_map(|entry| {
            let pool = entry.player_pool_entry.as_ref()?;
            let player = pool.player.as_ref();
            let mut eligible: Vec<String> = player
                .map(|p| {
                    p.eligible_slots
                        .iter()
                        .map(|id| slot_label(*id))
                        .filter(|label| !label.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            if eligible.is_empty() {
                if let Some(pos) = player.map(|p| position_label(p.default_position_id)) {
                    if !pos.is_empty() {
                        eligible.push(pos.to_string());
                    }
                }
            }
            Some(RosterSlotEntry {
                name: player.and_then(|p| p.full_name.clone()).unwrap_or_default(),
                points: player_points(pool, week),
                slot: slot_label(entry.lineup_slot_id).to_string(),
                eligible_slots: eligible,
            })
        })
        .collect()
}

fn projections_from_payload(week: u32, payload: &LeaguePayload) -> Vec<RosterProjection> {
    let slots = lineup_slots(payload.settings.as_ref());
    let mut projections: Vec<RosterProjection> = payload
        .teams
        .iter()
        .map(|team| lineup::project(team.id, week, &roster_entries(team, week), &slots))
        .collect();
    projections.sort_by_key(|p| p.team_id);
    projections
}

fn snippet(body: &str) -> String {
    let compact = body.split_whitespace().collect::<Vec<_>>().join(" ");
    compact.chars().take(BODY_SNIPPET_LEN).collect()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// ESPN league API client bound to one league and season.
pub struct EspnClient {
    http: Client,
    league_id: u64,
    season: u16,
    espn_s2: Option<SecretString>,
    swid: Option<SecretString>,
    hosts: [&'static str; 2],
}

impl EspnClient {
    pub fn new(league: &LeagueConfig, http: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build ESPN HTTP client")?;

        let hosts = if http.prefer_alt_host {
            [ALT_HOST, PRIMARY_HOST]
        } else {
            [PRIMARY_HOST, ALT_HOST]
        };

        Ok(Self {
            http: client,
            league_id: league.league_id,
            season: league.season,
            espn_s2: league.espn_s2.as_ref().map(|s| SecretString::new(s.expose_secret().clone())),
            swid: league.swid.as_ref().map(|s| SecretString::new(s.expose_secret().clone())),
            hosts,
        })
    }

    fn league_url(&self, host: &str) -> String {
        format!(
            "{host}/apis/v3/games/ffl/seasons/{}/segments/0/leagues/{}",
            self.season, self.league_id
        )
    }

    fn cookie_header(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(swid) = &self.swid {
            parts.push(format!("SWID={}", swid.expose_secret()));
        }
        if let Some(s2) = &self.espn_s2 {
            parts.push(format!("espn_s2={}", s2.expose_secret()));
        }
        (!parts.is_empty()).then(|| parts.join("; "))
    }

    /// GET the league endpoint with `query`, trying each host in order.
    ///
    /// Credential rejections return immediately; network failures, 5xx
    /// and non-JSON bodies move on to the next host and surface as
    /// `TransientNetwork` once every host has failed.
    async fn get_json<T: DeserializeOwned>(
        &self,
        query: &[(&str, String)],
    ) -> Result<T, SidepotError> {
        let mut last_error = SidepotError::TransientNetwork("no hosts attempted".into());

        for host in self.hosts {
            let url = self.league_url(host);
            let mut request = self
                .http
                .get(&url)
                .query(query)
                .header(ACCEPT, "application/json, text/plain, */*")
                .header(REFERER, "https://fantasy.espn.com/");
            if let Some(cookie) = self.cookie_header() {
                request = request.header(COOKIE, cookie);
            }

            debug!(url = %url, query = ?query, "Fetching ESPN league data");

            let resp = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(host, error = %e, "ESPN request failed");
                    last_error = SidepotError::TransientNetwork(format!("{host}: {e}"));
                    continue;
                }
            };

            let status = resp.status();
            let is_json = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|ct| ct.to_ascii_lowercase().contains("json"))
                .unwrap_or(false);

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                let body = resp.text().await.unwrap_or_default();
                return Err(SidepotError::AuthRejected {
                    status: status.as_u16(),
                    message: format!(
                        "verify league id/season and cookies (SWID needs braces, espn_s2 must be current): {}",
                        snippet(&body)
                    ),
                });
            }

            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                let body = resp.text().await.unwrap_or_default();
                warn!(host, %status, "ESPN server error");
                last_error =
                    SidepotError::TransientNetwork(format!("{host} status {status}: {}", snippet(&body)));
                continue;
            }

            if status == StatusCode::NOT_FOUND {
                return Err(SidepotError::Config(format!(
                    "league {} season {} not found",
                    self.league_id, self.season
                )));
            }

            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(SidepotError::Decode(format!(
                    "unexpected status {status}: {}",
                    snippet(&body)
                )));
            }

            let body = resp
                .text()
                .await
                .map_err(|e| SidepotError::TransientNetwork(format!("{host}: {e}")))?;

            if !is_json {
                warn!(host, "ESPN returned a non-JSON body, trying next host");
                last_error = SidepotError::TransientNetwork(format!(
                    "{host} returned non-JSON content: {}",
                    snippet(&body)
                ));
                continue;
            }

            return serde_json::from_str(&body)
                .map_err(|e| SidepotError::Decode(format!("{e}: {}", snippet(&body))));
        }

        Err(last_error)
    }

    async fn league_payload(&self, query: &[(&str, String)]) -> Result<LeaguePayload, SidepotError> {
        self.get_json::<LeaguePayload>(query).await
    }
}

#[async_trait]
impl LeagueDataSource for EspnClient {
    async fn fetch_league_profile(&self) -> Result<LeagueProfile, SidepotError> {
        let payload = self
            .league_payload(&[("view", "mSettings".into()), ("view", "mTeam".into())])
            .await?;
        let profile = profile_from_payload(&payload);
        info!(
            league_id = self.league_id,
            season = self.season,
            season_length = profile.season_length,
            current_period = profile.current_scoring_period,
            teams = profile.labels.len(),
            "Fetched ESPN league profile"
        );
        Ok(profile)
    }

    async fn fetch_matchups(&self, week: u32) -> Result<Vec<Matchup>, SidepotError> {
        let payload = self
            .league_payload(&[("view", "mMatchup".into()), ("scoringPeriodId", week.to_string())])
            .await?;
        Ok(matchups_from_payload(week, &payload))
    }

    async fn fetch_week_scores(&self, week: u32) -> Result<Vec<TeamWeekRecord>, SidepotError> {
        let matchups = self.fetch_matchups(week).await?;
        let records = records_from_matchups(&matchups);
        debug!(week, teams = records.len(), "Fetched week scores");
        Ok(records)
    }

    async fn fetch_rosters_with_projections(
        &self,
        week: u32,
    ) -> Result<Vec<RosterProjection>, SidepotError> {
        let payload = self
            .league_payload(&[
                ("view", "mRoster".into()),
                ("view", "mSettings".into()),
                ("scoringPeriodId", week.to_string()),
            ])
            .await?;
        let projections = projections_from_payload(week, &payload);
        debug!(week, teams = projections.len(), "Fetched roster projections");
        Ok(projections)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
