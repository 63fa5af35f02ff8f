//! Integration tests for player windows and the combined query.
//!
//! These tests verify window assembly (best first, contiguous ranks,
//! `start_rank`), its size near the edges of a leaderboard, and agreement
//! between window ranks and the full ordering.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use rankdrop::clock::ManualClock;
use rankdrop::{EngineConfig, Leaderboard, Rankdrop, ScoreStrategy, SortOrder};

/// Helper: "global" (DESC, best only) with P1..=P7 scoring 700 down to 100.
fn seven_players() -> Rankdrop {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), Duration::seconds(1));
    let rankdrop = Rankdrop::builder(EngineConfig::default())
        .clock(Arc::new(clock))
        .build()
        .unwrap();
    rankdrop
        .create_leaderboard(Leaderboard::new("global", SortOrder::Desc, ScoreStrategy::BestOnly))
        .unwrap();
    for i in 1..=7u32 {
        rankdrop
            .engine()
            .submit("global", &format!("P{i}"), f64::from(800 - i * 100), None)
            .unwrap();
    }
    rankdrop
}

#[test]
fn test_p5_window() {
    let rankdrop = seven_players();
    let window = rankdrop.query().player_window("global", "P5", 2).unwrap();

    assert_eq!(window.start_rank, 3);
    let rows: Vec<(&str, u64)> = window
        .entries
        .iter()
        .map(|r| (r.entry.player_alias.as_str(), r.rank))
        .collect();
    assert_eq!(
        rows,
        vec![("P3", 3), ("P4", 4), ("P5", 5), ("P6", 6), ("P7", 7)]
    );
}

#[test]
fn test_window_size_formula() {
    let rankdrop = seven_players();
    let total = 7u64;

    for player in 1..=7u64 {
        for radius in 0..=8u64 {
            let window = rankdrop
                .query()
                .player_window("global", &format!("P{player}"), radius as usize)
                .unwrap();
            let better = player - 1;
            let worse = total - player;
            let expected = radius.min(better) + 1 + radius.min(worse);
            assert_eq!(window.entries.len() as u64, expected, "P{player} radius {radius}");

            // Contiguous, starting at start_rank, matching the full ordering
            for (offset, row) in window.entries.iter().enumerate() {
                let rank = window.start_rank + offset as u64;
                assert_eq!(row.rank, rank);
                assert_eq!(row.entry.player_alias, format!("P{rank}"));
            }
        }
    }
}

#[test]
fn test_window_after_improvement() {
    let rankdrop = seven_players();
    rankdrop.engine().submit("global", "P7", 650.0, None).unwrap();

    let window = rankdrop.query().player_window("global", "P7", 1).unwrap();
    assert_eq!(window.start_rank, 1);
    let aliases: Vec<&str> = window.entries.iter().map(|r| r.entry.player_alias.as_str()).collect();
    assert_eq!(aliases, vec!["P1", "P7", "P2"]);
}

#[test]
fn test_combined_query() {
    let rankdrop = seven_players();
    let combined = rankdrop.query().combined("global", 3, "P7", 1).unwrap();

    assert_eq!(combined.top.len(), 3);
    assert_eq!(combined.top[0].entry.player_alias, "P1");
    assert_eq!(combined.player.start_rank, 6);
    assert_eq!(combined.player.entries.len(), 2);
}

#[test]
fn test_window_matches_top_ranks() {
    let rankdrop = seven_players();
    let top = rankdrop.query().top_n("global", 7).unwrap();
    for row in &top {
        let window = rankdrop
            .query()
            .player_window("global", &row.entry.player_alias, 0)
            .unwrap();
        assert_eq!(window.start_rank, row.rank);
        assert_eq!(window.entries[0].entry, row.entry);
    }
}
