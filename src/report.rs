//! Report formatting.
//!
//! Turns engine results into one compact message per competition. Output
//! depends only on the inputs, so identical standings always render to
//! identical text.

use rust_decimal::Decimal;
use std::fmt;

use crate::sidepots::survivor::Elimination;
use crate::sidepots::{EfficiencySeason, PirSeason, SurvivorPool};
use crate::types::{Mode, StandingsRow, TeamLabels};

/// Longest body the notification channel accepts.
pub const MAX_BODY_CHARS: usize = 4000;

/// Rows shown in season leaderboards.
const LEADERBOARD_ROWS: usize = 5;

// ---------------------------------------------------------------------------
// Week range label
// ---------------------------------------------------------------------------

/// The processed weeks, rendered for report headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekRange(Vec<u32>);

impl WeekRange {
    /// `weeks` must be ascending.
    pub fn new(weeks: &[u32]) -> Self {
        Self(weeks.to_vec())
    }

    fn is_consecutive(&self) -> bool {
        self.0.windows(2).all(|w| w[1] == w[0] + 1)
    }
}

impl fmt::Display for WeekRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => write!(f, "No weeks"),
            [only] => write!(f, "Week {only}"),
            [first, .., last] if self.is_consecutive() => write!(f, "Weeks {first}-{last}"),
            weeks => {
                let parts: Vec<String> = weeks.iter().map(u32::to_string).collect();
                write!(f, "Weeks {}", parts.join(", "))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub mode: Mode,
    pub title: String,
    pub lines: Vec<String>,
}

impl Report {
    pub fn new(mode: Mode, lines: Vec<String>) -> Self {
        Self {
            mode,
            title: mode.title().to_string(),
            lines,
        }
    }

    /// Lines joined by newlines, cut to [`MAX_BODY_CHARS`] characters.
    pub fn body(&self) -> String {
        let body = self.lines.join("\n");
        match body.char_indices().nth(MAX_BODY_CHARS) {
            Some((cut, _)) => body[..cut].to_string(),
            None => body,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}]", self.title)?;
        write!(f, "{}", self.body())
    }
}

fn pts(value: Decimal, dp: u32) -> String {
    format!("{:.*}", dp as usize, value.round_dp(dp))
}

// ---------------------------------------------------------------------------
// Formatters
// ---------------------------------------------------------------------------

pub fn format_pir(season: &PirSeason, weeks: &WeekRange, labels: &TeamLabels) -> Report {
    let mut lines = vec![weeks.to_string()];

    for week in season.weeks() {
        match week.winner() {
            Some(w) => lines.push(format!(
                "Week {}: {} - {} (Δ {})",
                week.week,
                labels.label_for(w.team_id),
                pts(w.points, 2),
                pts(w.delta, 2)
            )),
            None => lines.push(format!(
                "Week {}: no qualifying score (target {})",
                week.week,
                pts(week.target, 2)
            )),
        }
    }

    if season.weeks().len() > 1 {
        lines.push(String::new());
        lines.push("Standings".to_string());
        for row in season.standings().iter().take(LEADERBOARD_ROWS) {
            lines.push(format!(
                "{}. {}: {} wins (Pts {})",
                row.rank,
                labels.label_for(row.entity_id),
                row.metric_value,
                pts(row.tiebreak_value, 2)
            ));
        }

        let closest = season.closest_finishes(LEADERBOARD_ROWS);
        if !closest.is_empty() {
            lines.push(String::new());
            lines.push("Closest finishes".to_string());
            for finish in &closest {
                lines.push(format!(
                    "{} - {} (Δ {}, week {})",
                    labels.label_for(finish.team_id),
                    pts(finish.points, 2),
                    pts(finish.delta, 2),
                    finish.week
                ));
            }
        }
    }

    if season.weeks().iter().all(|w| w.winner().is_none()) {
        lines.push("No qualifying scores".to_string());
    }

    Report::new(Mode::Pir, lines)
}

pub fn format_efficiency(season: &EfficiencySeason, weeks: &WeekRange, labels: &TeamLabels) -> Report {
    let mut lines = vec![weeks.to_string()];
    let standings = season.standings();

    if standings.is_empty() {
        lines.push("No efficiency data".to_string());
        return Report::new(Mode::Efficiency, lines);
    }

    // With a single week the season table is that week's ranking.
    if season.weeks().len() > 1 {
        if let Some((week, rows)) = season.latest_week().filter(|(_, rows)| !rows.is_empty()) {
            lines.push(format!("Week {week}"));
            push_efficiency_rows(&mut lines, rows, labels);
            lines.push(String::new());
        }
        lines.push("Season".to_string());
    }
    push_efficiency_rows(&mut lines, &standings, labels);

    Report::new(Mode::Efficiency, lines)
}

fn push_efficiency_rows(lines: &mut Vec<String>, rows: &[StandingsRow], labels: &TeamLabels) {
    for row in rows {
        lines.push(format!(
            "{}. {}: {} (Pts {})",
            row.rank,
            labels.label_for(row.entity_id),
            pts(row.metric_value, 3),
            pts(row.tiebreak_value, 1)
        ));
    }
}

pub fn format_survivor(pool: &SurvivorPool, weeks: &WeekRange, labels: &TeamLabels) -> Report {
    let mut lines = vec![format!("{weeks} · rule: {}", pool.rule())];

    let mut by_week: Vec<(u32, Vec<&Elimination>)> = Vec::new();
    for elimination in pool.eliminations() {
        match by_week.last_mut() {
            Some((week, group)) if *week == elimination.week => group.push(elimination),
            _ => by_week.push((elimination.week, vec![elimination])),
        }
    }

    if by_week.is_empty() {
        lines.push("No eliminations yet".to_string());
    }
    for (week, group) in &by_week {
        match group.as_slice() {
            [single] => lines.push(format!(
                "Week {week}: {} eliminated ({})",
                labels.label_for(single.team_id),
                pts(single.points, 2)
            )),
            joint => {
                let names: Vec<String> = joint
                    .iter()
                    .map(|e| format!("{} ({})", labels.label_for(e.team_id), pts(e.points, 2)))
                    .collect();
                lines.push(format!("Week {week}: {} eliminated jointly", names.join(", ")));
            }
        }
    }

    let alive = pool.alive();
    if let Some(winner) = pool.winner() {
        lines.push(format!("Winner: {}", labels.label_for(winner)));
    } else if alive.is_empty() {
        lines.push("No survivors: the final entrants were eliminated together".to_string());
    } else {
        let names: Vec<String> = alive.iter().map(|t| labels.label_for(*t)).collect();
        lines.push(format!("Alive: {}", names.join(", ")));
    }

    Report::new(Mode::Survivor, lines)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
