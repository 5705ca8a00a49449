//! End-to-end runs of the orchestrator against the in-memory league.

use chrono::Utc;
use std::sync::Arc;

use sidepots::config::{AppConfig, WebhookConfig};
use sidepots::engine::dispatch::Dispatcher;
use sidepots::engine::orchestrator::{ModeStatus, Orchestrator, RunSettings};
use sidepots::guard::{MemoryRunGuard, RunLease};
use sidepots::retry::RetryPolicy;
use sidepots::schedule::WeekSpec;
use sidepots::sidepots::{EliminationRule, TargetRule};
use sidepots::types::{Mode, ModeSelection};

use crate::fakes::{FakeLeague, RecordingNotifier};

const PIR_HOOK: &str = "https://discord.example/api/webhooks/pir";
const EFFICIENCY_HOOK: &str = "https://discord.example/api/webhooks/efficiency";
const SURVIVOR_HOOK: &str = "https://discord.example/api/webhooks/survivor";

fn webhooks() -> WebhookConfig {
    WebhookConfig {
        pir: Some(PIR_HOOK.into()),
        efficiency: Some(EFFICIENCY_HOOK.into()),
        survivor: Some(SURVIVOR_HOOK.into()),
    }
}

fn settings(rule: EliminationRule) -> RunSettings {
    RunSettings {
        target_rule: TargetRule::default(),
        survivor_rule: rule,
        survivor_start_week: 1,
        regular_season_weeks: None,
        week1_finalized_at: None,
        retry: RetryPolicy::none(),
    }
}

fn orchestrator(
    league: &Arc<FakeLeague>,
    notifier: &Arc<RecordingNotifier>,
    settings: RunSettings,
    dry_run: bool,
) -> Orchestrator {
    let dispatcher = Dispatcher::new(notifier.clone(), webhooks(), dry_run, RetryPolicy::none());
    Orchestrator::new(league.clone(), dispatcher, settings)
}

#[tokio::test]
async fn test_auto_run_posts_all_three_reports() {
    let league = Arc::new(FakeLeague::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let orch = orchestrator(&league, &notifier, settings(EliminationRule::LowestScore), false);

    let summary = orch.run(ModeSelection::All, &WeekSpec::Auto, Utc::now()).await;

    assert_eq!(summary.weeks, vec![1, 2, 3]);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(notifier.delivered().len(), 3);
    assert_eq!(league.profile_calls(), 1);
    // Scores are fetched once per week and shared by PIR and survivor.
    assert_eq!(league.score_calls(), 3);

    let endpoints: Vec<String> = notifier.delivered().into_iter().map(|(e, _)| e).collect();
    assert_eq!(endpoints, vec![PIR_HOOK, EFFICIENCY_HOOK, SURVIVOR_HOOK]);
}

#[tokio::test]
async fn test_price_is_right_report_contents() {
    let league = Arc::new(FakeLeague::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let orch = orchestrator(&league, &notifier, settings(EliminationRule::LowestScore), false);

    orch.run(ModeSelection::Pir, &WeekSpec::Range(1, 3), Utc::now()).await;

    let report = notifier.report_for(Mode::Pir).unwrap();
    assert_eq!(report.title, "Price Is Right");
    assert_eq!(report.lines[0], "Weeks 1-3");
    assert!(report.lines.contains(&"Week 1: Charlie - 149.50 (Δ 0.50)".to_string()));
    assert!(report.lines.contains(&"Week 2: Charlie - 140.00 (Δ 10.00)".to_string()));
    assert!(report.lines.contains(&"Week 3: Alpha - 150.00 (Δ 0.00)".to_string()));
    assert!(report.lines.iter().any(|l| l.starts_with("1. Charlie: 2 wins")));
}

#[tokio::test]
async fn test_per_week_target_override() {
    let league = Arc::new(FakeLeague::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let mut run_settings = settings(EliminationRule::LowestScore);
    run_settings.target_rule.week_targets.insert(1, rust_decimal_macros::dec!(125));
    let orch = orchestrator(&league, &notifier, run_settings, false);

    orch.run(ModeSelection::Pir, &WeekSpec::Single(1), Utc::now()).await;

    let report = notifier.report_for(Mode::Pir).unwrap();
    assert_eq!(report.lines, vec!["Week 1", "Week 1: Bravo - 120.00 (Δ 5.00)"]);
}

#[tokio::test]
async fn test_efficiency_report_ranks_by_mean_ratio() {
    let league = Arc::new(FakeLeague::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let orch = orchestrator(&league, &notifier, settings(EliminationRule::LowestScore), false);

    orch.run(ModeSelection::Efficiency, &WeekSpec::List(vec![3, 1, 2]), Utc::now())
        .await;

    let report = notifier.report_for(Mode::Efficiency).unwrap();
    assert_eq!(
        report.lines,
        vec![
            "Weeks 1-3",
            "Week 3",
            "1. Alpha: 1.000 (Pts 100.0)",
            "2. Bravo: 0.900 (Pts 90.0)",
            "3. Charlie: 0.800 (Pts 120.0)",
            "4. Delta: 0.800 (Pts 80.0)",
            "",
            "Season",
            "1. Alpha: 1.000 (Pts 300.0)",
            "2. Bravo: 0.900 (Pts 270.0)",
            // Equal ratios fall back to total actual points.
            "3. Charlie: 0.800 (Pts 360.0)",
            "4. Delta: 0.800 (Pts 240.0)",
        ]
    );
}

#[tokio::test]
async fn test_survivor_lowest_score_runs_to_a_winner() {
    let league = Arc::new(FakeLeague::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let orch = orchestrator(&league, &notifier, settings(EliminationRule::LowestScore), false);

    orch.run(ModeSelection::Survivor, &WeekSpec::Range(1, 3), Utc::now()).await;

    let report = notifier.report_for(Mode::Survivor).unwrap();
    assert_eq!(
        report.lines,
        vec![
            "Weeks 1-3 · rule: lowest_score",
            "Week 1: Delta eliminated (98.00)",
            "Week 2: Bravo eliminated (110.00)",
            "Week 3: Charlie eliminated (145.00)",
            "Winner: Alpha",
        ]
    );
}

#[tokio::test]
async fn test_survivor_head_to_head_stops_once_decided() {
    let league = Arc::new(FakeLeague::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let orch = orchestrator(&league, &notifier, settings(EliminationRule::HeadToHeadLoss), false);

    orch.run(ModeSelection::Survivor, &WeekSpec::Range(1, 3), Utc::now()).await;

    let report = notifier.report_for(Mode::Survivor).unwrap();
    assert_eq!(
        report.lines,
        vec![
            "Weeks 1-3 · rule: head_to_head_loss",
            "Week 1: Bravo (120.00), Delta (98.00) eliminated jointly",
            "Week 2: Alpha eliminated (130.00)",
            "Winner: Charlie",
        ]
    );
    // Week 3 is never needed once a single entrant remains.
    assert_eq!(league.score_calls(), 2);
}

#[tokio::test]
async fn test_failed_delivery_is_isolated_and_sets_exit_code() {
    let league = Arc::new(FakeLeague::new());
    let notifier = Arc::new(RecordingNotifier::new());
    notifier.reject_endpoint(PIR_HOOK);
    let orch = orchestrator(&league, &notifier, settings(EliminationRule::LowestScore), false);

    let summary = orch.run(ModeSelection::All, &WeekSpec::Auto, Utc::now()).await;

    assert!(matches!(summary.status_of(Mode::Pir), Some(ModeStatus::Failed(msg)) if msg.contains("404")));
    assert_eq!(summary.status_of(Mode::Efficiency), Some(&ModeStatus::Delivered));
    assert_eq!(summary.status_of(Mode::Survivor), Some(&ModeStatus::Delivered));
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(notifier.delivered().len(), 2);
}

#[tokio::test]
async fn test_expired_credentials_fail_only_roster_mode() {
    let league = Arc::new(FakeLeague::new());
    league.reject_rosters(401);
    let notifier = Arc::new(RecordingNotifier::new());
    let orch = orchestrator(&league, &notifier, settings(EliminationRule::LowestScore), false);

    let summary = orch.run(ModeSelection::All, &WeekSpec::Auto, Utc::now()).await;

    assert_eq!(summary.failed().len(), 1);
    assert_eq!(summary.failed()[0].mode, Mode::Efficiency);
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn test_dry_run_posts_nothing() {
    let league = Arc::new(FakeLeague::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let orch = orchestrator(&league, &notifier, settings(EliminationRule::LowestScore), true);

    let summary = orch.run(ModeSelection::All, &WeekSpec::Auto, Utc::now()).await;

    assert!(notifier.delivered().is_empty());
    assert!(summary.results.iter().all(|r| r.status == ModeStatus::DryRun));
    assert_eq!(summary.exit_code(), 0);
}

#[tokio::test]
async fn test_week_outside_season_fails_run() {
    let league = Arc::new(FakeLeague::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let orch = orchestrator(&league, &notifier, settings(EliminationRule::LowestScore), false);

    let summary = orch.run(ModeSelection::All, &WeekSpec::Single(15), Utc::now()).await;

    assert_eq!(summary.failed().len(), 3);
    assert!(notifier.delivered().is_empty());
}

#[test]
fn test_second_run_is_blocked_while_lock_held() {
    let guard = MemoryRunGuard::default();
    let now = Utc::now();

    let first = RunLease::acquire(&guard, now).unwrap();
    assert!(first.is_some());
    assert!(RunLease::acquire(&guard, now + chrono::Duration::seconds(30))
        .unwrap()
        .is_none());

    first.unwrap().release().unwrap();
    assert!(!guard.is_held());
    assert!(RunLease::acquire(&guard, now + chrono::Duration::seconds(31))
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_config_with_env_overrides_drives_run() {
    let toml = r#"
        [league]
        league_id = 42
        season = 2025

        [pir]
        target = 100.00

        [survivor]
        rule = "head_to_head_loss"

        [webhooks]
        pir = "https://discord.example/api/webhooks/from-file"
    "#;
    let cfg = AppConfig::from_toml_with(toml, |key| match key {
        "WEBHOOK_PIR" => Some(PIR_HOOK.to_string()),
        "SEASON" => Some("2024".to_string()),
        _ => None,
    })
    .unwrap();
    assert_eq!(cfg.league.season, 2024);
    assert_eq!(cfg.webhooks.endpoint_for(Mode::Pir), Some(PIR_HOOK));

    let league = Arc::new(FakeLeague::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let run_settings = cfg.run_settings().unwrap();
    assert_eq!(run_settings.survivor_rule, EliminationRule::HeadToHeadLoss);

    let dispatcher = Dispatcher::new(notifier.clone(), cfg.webhooks.clone(), false, RetryPolicy::none());
    let orch = Orchestrator::new(league.clone(), dispatcher, run_settings);
    let summary = orch.run(ModeSelection::Pir, &WeekSpec::Single(2), Utc::now()).await;

    assert_eq!(summary.exit_code(), 0);
    let (endpoint, report) = notifier.delivered().pop().unwrap();
    assert_eq!(endpoint, PIR_HOOK);
    assert_eq!(report.lines[1], "Week 2: no qualifying score (target 100.00)");
}
