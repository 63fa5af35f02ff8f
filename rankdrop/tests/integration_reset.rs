//! Integration tests for resets, archives and automatic scheduling.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rankdrop::clock::ManualClock;
use rankdrop::{EngineConfig, Leaderboard, Rankdrop, ResetFrequency, ScoreStrategy, SortOrder};
use tempfile::tempdir;

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

/// Helper: an instance whose clock is frozen at `start` and moved by hand.
fn rankdrop_at(start: DateTime<Utc>) -> (Rankdrop, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start, Duration::milliseconds(1)));
    let rankdrop = Rankdrop::builder(EngineConfig::default())
        .clock(clock.clone())
        .build()
        .unwrap();
    (rankdrop, clock)
}

#[test]
fn test_s1_archive_scenario() {
    let (rankdrop, _clock) = rankdrop_at(at(2024, 3, 1, 12));
    rankdrop
        .create_leaderboard(Leaderboard::new("global", SortOrder::Desc, ScoreStrategy::BestOnly))
        .unwrap();
    rankdrop.engine().submit("global", "A", 10.0, None).unwrap();
    rankdrop.engine().submit("global", "B", 20.0, None).unwrap();
    rankdrop.query().top_n("global", 10).unwrap();

    rankdrop.archive().reset("global", true, Some("S1")).unwrap();

    let summaries = rankdrop.archive().archive_summaries(None).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].leaderboard_slug, "global");
    assert_eq!(summaries[0].reset_label, "S1");
    assert_eq!(summaries[0].entry_count, 2);

    assert!(rankdrop.query().top_n("global", 10).unwrap().is_empty());
    assert_eq!(rankdrop.entry_count("global").unwrap(), 0);

    // The board is usable again right away
    assert_eq!(rankdrop.engine().submit("global", "A", 1.0, None).unwrap().rank, 1);
}

#[test]
fn test_summaries_newest_first() {
    let (rankdrop, clock) = rankdrop_at(at(2024, 3, 1, 12));
    rankdrop
        .create_leaderboard(Leaderboard::new("global", SortOrder::Desc, ScoreStrategy::MultipleEntries))
        .unwrap();

    for label in ["season-1", "season-2", "season-3"] {
        rankdrop.engine().submit("global", "A", 1.0, None).unwrap();
        rankdrop.archive().reset("global", true, Some(label)).unwrap();
        clock.advance(Duration::days(1));
    }

    let labels: Vec<String> = rankdrop
        .archive()
        .archive_summaries(Some("global"))
        .unwrap()
        .into_iter()
        .map(|s| s.reset_label)
        .collect();
    assert_eq!(labels, vec!["season-3", "season-2", "season-1"]);
    assert!(rankdrop.archive().archive_summaries(Some("other")).unwrap().is_empty());
}

#[test]
fn test_next_reset_at_examples() {
    assert_eq!(ResetFrequency::Daily.next_reset_after(at(2024, 1, 31, 23)), Some(at(2024, 2, 1, 0)));
    // 2024-01-01 is a Monday: the next reset is a full week later
    assert_eq!(ResetFrequency::Weekly.next_reset_after(at(2024, 1, 1, 0)), Some(at(2024, 1, 8, 0)));
    assert_eq!(ResetFrequency::Monthly.next_reset_after(at(2024, 2, 29, 8)), Some(at(2024, 3, 1, 0)));
    assert_eq!(ResetFrequency::None.next_reset_after(at(2024, 2, 29, 8)), None);
}

#[test]
fn test_scheduled_daily_reset() {
    let (rankdrop, clock) = rankdrop_at(at(2024, 6, 10, 18));
    rankdrop
        .create_leaderboard(
            Leaderboard::new("daily", SortOrder::Desc, ScoreStrategy::Cumulative)
                .with_reset(ResetFrequency::Daily, true),
        )
        .unwrap();
    assert_eq!(rankdrop.leaderboard("daily").unwrap().next_reset_at, Some(at(2024, 6, 11, 0)));

    rankdrop.engine().submit("daily", "A", 3.0, None).unwrap();
    assert!(rankdrop.archive().run_due_resets().unwrap().completed.is_empty());

    clock.set(at(2024, 6, 11, 0) + Duration::seconds(30));
    let outcome = rankdrop.archive().run_due_resets().unwrap();
    assert_eq!(outcome.completed.len(), 1);
    assert_eq!(outcome.completed[0].archive_label.as_deref(), Some("Auto-Reset DAILY 11.06.2024"));
    assert_eq!(rankdrop.entry_count("daily").unwrap(), 0);
    assert_eq!(rankdrop.leaderboard("daily").unwrap().next_reset_at, Some(at(2024, 6, 12, 0)));

    let rows = rankdrop
        .archive()
        .archived_scores("daily", "Auto-Reset DAILY 11.06.2024", 10)
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].score_value, 3.0);
}

#[test]
fn test_scheduled_reset_without_archive() {
    let (rankdrop, clock) = rankdrop_at(at(2024, 6, 10, 18));
    rankdrop
        .create_leaderboard(
            Leaderboard::new("monthly", SortOrder::Asc, ScoreStrategy::BestOnly)
                .with_reset(ResetFrequency::Monthly, false),
        )
        .unwrap();
    rankdrop.engine().submit("monthly", "A", 3.0, None).unwrap();

    clock.set(at(2024, 7, 1, 0));
    let outcome = rankdrop.archive().run_due_resets().unwrap();
    assert_eq!(outcome.completed.len(), 1);
    assert!(outcome.completed[0].archive_label.is_none());
    assert!(rankdrop.archive().archive_summaries(None).unwrap().is_empty());
}

#[test]
fn test_archives_survive_reopen() {
    let temp_dir = tempdir().unwrap();
    {
        let rankdrop = Rankdrop::open(temp_dir.path(), EngineConfig::default()).unwrap();
        rankdrop
            .create_leaderboard(Leaderboard::new("global", SortOrder::Desc, ScoreStrategy::BestOnly))
            .unwrap();
        rankdrop.engine().submit("global", "A", 10.0, None).unwrap();
        rankdrop.archive().reset("global", true, Some("S1")).unwrap();
        rankdrop.flush().unwrap();
    }

    let reopened = Rankdrop::open(temp_dir.path(), EngineConfig::default()).unwrap();
    let rows = reopened.archive().archived_scores("global", "S1", 10).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].player_alias, "A");
}
