//! Starting lineup scoring.
//!
//! Computes what a team actually started and the best lineup it could have
//! started from the same roster, honouring the league's slot layout and
//! flex eligibility.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use crate::types::RosterProjection;

/// Lineup slots that do not score.
pub const NON_STARTING_SLOTS: &[&str] = &["BE", "BN", "BENCH", "IR", "RES", "INJ", "TAXI"];

/// Positions allowed in the superflex (`OP`) slot.
const OP_POSITIONS: &[&str] = &["QB", "TQB", "RB", "WR", "TE"];

/// Positions allowed in the `ER` slot.
const ER_POSITIONS: &[&str] = &["RB", "WR", "TE"];

/// Bitmask search supports at most this many candidate players.
const MAX_CANDIDATES: usize = 64;

/// One rostered player for a scoring week.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterSlotEntry {
    pub name: String,
    pub points: Decimal,
    /// Lineup slot the player was placed in (`QB`, `RB/WR/TE`, `BE`, ...).
    pub slot: String,
    /// Slot labels the player may fill.
    pub eligible_slots: Vec<String>,
}

pub fn is_starting_slot(slot: &str) -> bool {
    let slot = slot.trim();
    !slot.is_empty() && !NON_STARTING_SLOTS.iter().any(|s| s.eq_ignore_ascii_case(slot))
}

/// Expand `{slot: count}` into one label per starting slot.
pub fn expand_slot_counts(counts: &BTreeMap<String, u32>) -> Vec<String> {
    counts
        .iter()
        .filter(|(slot, _)| is_starting_slot(slot))
        .flat_map(|(slot, count)| std::iter::repeat(slot.clone()).take(*count as usize))
        .collect()
}

/// Whether a player with `eligible` slots may fill `slot`.
pub fn slot_allows(slot: &str, eligible: &[String]) -> bool {
    let slot = slot.trim().to_ascii_uppercase();
    let has = |label: &str| eligible.iter().any(|e| e.eq_ignore_ascii_case(label));

    if has(&slot) {
        return true;
    }
    match slot.as_str() {
        "OP" => OP_POSITIONS.iter().any(|p| has(p)),
        "ER" => ER_POSITIONS.iter().any(|p| has(p)),
        "D/ST" => has("DST") || has("DEF"),
        composite if composite.contains('/') => composite
            .split('/')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .any(has),
        _ => false,
    }
}

/// Points scored by the players placed in starting slots.
pub fn actual_lineup_points(roster: &[RosterSlotEntry]) -> Decimal {
    roster
        .iter()
        .filter(|p| is_starting_slot(&p.slot))
        .map(|p| p.points)
        .sum()
}

/// Starting slots implied by the lineup that was actually set.
pub fn slots_from_lineup(roster: &[RosterSlotEntry]) -> Vec<String> {
    let mut slots: Vec<String> = roster
        .iter()
        .filter(|p| is_starting_slot(&p.slot))
        .map(|p| p.slot.trim().to_ascii_uppercase())
        .collect();
    slots.sort();
    slots
}

/// Best achievable total for `slots` using `roster`.
///
/// Exact search over slot assignments; a slot may stay empty. Players with
/// non-positive points or no eligible slot never improve a lineup and are
/// skipped.
pub fn optimal_lineup_points(roster: &[RosterSlotEntry], slots: &[String]) -> Decimal {
    let mut candidates: Vec<&RosterSlotEntry> = roster
        .iter()
        .filter(|p| p.points > Decimal::ZERO)
        .filter(|p| slots.iter().any(|s| slot_allows(s, &p.eligible_slots)))
        .collect();

    if candidates.is_empty() || slots.is_empty() {
        return Decimal::ZERO;
    }

    if candidates.len() > MAX_CANDIDATES {
        warn!(
            players = candidates.len(),
            "Roster too large for exact lineup search, keeping highest scorers"
        );
        candidates.sort_by(|a, b| b.points.cmp(&a.points));
        candidates.truncate(MAX_CANDIDATES);
    }

    // eligibility[slot][player]
    let eligibility: Vec<Vec<bool>> = slots
        .iter()
        .map(|slot| {
            candidates
                .iter()
                .map(|p| slot_allows(slot, &p.eligible_slots))
                .collect()
        })
        .collect();
    let points: Vec<Decimal> = candidates.iter().map(|p| p.points).collect();

    let mut memo = HashMap::new();
    best_assignment(0, 0, &eligibility, &points, &mut memo)
}

fn best_assignment(
    slot_idx: usize,
    used: u64,
    eligibility: &[Vec<bool>],
    points: &[Decimal],
    memo: &mut HashMap<(usize, u64), Decimal>,
) -> Decimal {
    if slot_idx >= eligibility.len() {
        return Decimal::ZERO;
    }
    if let Some(cached) = memo.get(&(slot_idx, used)) {
        return *cached;
    }

    let mut best = best_assignment(slot_idx + 1, used, eligibility, points, memo);
    for (player, allowed) in eligibility[slot_idx].iter().enumerate() {
        let bit = 1u64 << player;
        if !allowed || used & bit != 0 {
            continue;
        }
        let candidate =
            points[player] + best_assignment(slot_idx + 1, used | bit, eligibility, points, memo);
        if candidate > best {
            best = candidate;
        }
    }

    memo.insert((slot_idx, used), best);
    best
}

/// Build a team-week projection. Uses the league slot layout when known,
/// otherwise the slots of the lineup that was set.
pub fn project(
    team_id: u32,
    week: u32,
    roster: &[RosterSlotEntry],
    league_slots: &[String],
) -> RosterProjection {
    let actual = actual_lineup_points(roster);
    let optimal = if league_slots.is_empty() {
        optimal_lineup_points(roster, &slots_from_lineup(roster))
    } else {
        optimal_lineup_points(roster, league_slots)
    };
    RosterProjection::new(team_id, week, actual, optimal)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn player(name: &str, points: Decimal, slot: &str, eligible: &[&str]) -> RosterSlotEntry {
        RosterSlotEntry {
            name: name.to_string(),
            points,
            slot: slot.to_string(),
            eligible_slots: eligible.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn flex_roster() -> Vec<RosterSlotEntry> {
        vec![
            player("QB1", dec!(20), "QB", &["QB", "OP"]),
            player("RB1", dec!(25), "RB", &["RB", "RB/WR/TE", "OP"]),
            player("RB2", dec!(20), "RB", &["RB", "RB/WR/TE", "OP"]),
            player("RB3", dec!(18), "BE", &["RB", "RB/WR/TE", "OP"]),
            player("WR1", dec!(19), "WR", &["WR", "RB/WR/TE", "OP"]),
            player("WR2", dec!(18), "WR", &["WR", "RB/WR/TE", "OP"]),
            player("WR3", dec!(16), "RB/WR/TE", &["WR", "RB/WR/TE", "OP"]),
            player("TE1", dec!(30), "BE", &["TE", "RB/WR/TE", "OP"]),
            player("TE2", dec!(5), "TE", &["TE", "RB/WR/TE", "OP"]),
        ]
    }

    fn standard_slots() -> Vec<String> {
        let counts: BTreeMap<String, u32> = [("QB", 1), ("RB", 2), ("WR", 2), ("TE", 1), ("RB/WR/TE", 1), ("BE", 6)]
            .into_iter()
            .map(|(s, c)| (s.to_string(), c))
            .collect();
        expand_slot_counts(&counts)
    }

    #[test]
    fn test_expand_slot_counts_skips_bench() {
        let slots = standard_slots();
        assert_eq!(slots.len(), 7);
        assert!(!slots.iter().any(|s| s == "BE"));
        assert_eq!(slots.iter().filter(|s| *s == "RB").count(), 2);
    }

    #[test]
    fn test_optimal_beats_greedy() {
        // A greedy fill puts TE1 in the flex and strands RB3, totalling 137.
        let optimal = optimal_lineup_points(&flex_roster(), &standard_slots());
        assert_eq!(optimal, dec!(150));
    }

    #[test]
    fn test_actual_counts_only_starters() {
        // QB1 + RB1 + RB2 + WR1 + WR2 + WR3 + TE2
        assert_eq!(actual_lineup_points(&flex_roster()), dec!(123));
    }

    #[test]
    fn test_project_optimal_at_least_actual() {
        let p = project(4, 3, &flex_roster(), &standard_slots());
        assert_eq!(p.actual_lineup_points, dec!(123));
        assert_eq!(p.optimal_lineup_points, dec!(150));
        assert_eq!(p.efficiency(), Some(dec!(0.82)));
    }

    #[test]
    fn test_project_without_league_slots_uses_lineup() {
        let p = project(4, 3, &flex_roster(), &[]);
        assert_eq!(p.optimal_lineup_points, dec!(150));
    }

    #[test]
    fn test_negative_starter_can_be_benched() {
        let roster = vec![
            player("K1", dec!(-2), "K", &["K"]),
            player("K2", dec!(7), "BE", &["K"]),
        ];
        let p = project(1, 1, &roster, &["K".to_string()]);
        assert_eq!(p.actual_lineup_points, dec!(-2));
        assert_eq!(p.optimal_lineup_points, dec!(7));
    }

    #[test]
    fn test_slot_allows_flex_rules() {
        let rb = vec!["RB".to_string()];
        let qb = vec!["QB".to_string()];
        let dst = vec!["D/ST".to_string()];
        assert!(slot_allows("OP", &qb));
        assert!(slot_allows("ER", &rb));
        assert!(!slot_allows("ER", &qb));
        assert!(slot_allows("RB/WR", &rb));
        assert!(!slot_allows("WR/TE", &rb));
        assert!(slot_allows("D/ST", &dst));
        assert!(!slot_allows("K", &rb));
    }

    #[test]
    fn test_empty_roster() {
        assert_eq!(optimal_lineup_points(&[], &standard_slots()), Decimal::ZERO);
        assert_eq!(actual_lineup_points(&[]), Decimal::ZERO);
    }
}
