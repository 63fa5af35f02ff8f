//! Integration tests for concurrent submissions.
//!
//! Writers for the same player race on the conditional store operations;
//! these tests check that no update is lost and the one-row-per-player
//! invariant holds under contention.

use std::sync::Arc;
use std::thread;

use rankdrop::{EngineConfig, Leaderboard, Rankdrop, ScoreStrategy, SortOrder};

const THREADS: usize = 8;
const PER_THREAD: usize = 200;

fn shared(strategy: ScoreStrategy) -> Arc<Rankdrop> {
    let rankdrop = Rankdrop::in_memory(EngineConfig::default()).unwrap();
    rankdrop
        .create_leaderboard(Leaderboard::new("race", SortOrder::Desc, strategy))
        .unwrap();
    Arc::new(rankdrop)
}

#[test]
fn test_cumulative_sums_exactly() {
    let rankdrop = shared(ScoreStrategy::Cumulative);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let rankdrop = Arc::clone(&rankdrop);
            thread::spawn(move || {
                for _ in 0..PER_THREAD {
                    rankdrop.engine().submit("race", "P1", 1.0, None).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(rankdrop.entry_count("race").unwrap(), 1);
    let window = rankdrop.query().player_window("race", "P1", 0).unwrap();
    assert_eq!(window.entries[0].entry.score_value, (THREADS * PER_THREAD) as f64);
}

#[test]
fn test_best_only_keeps_maximum() {
    let rankdrop = shared(ScoreStrategy::BestOnly);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let rankdrop = Arc::clone(&rankdrop);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let value = (i * THREADS + t) as f64;
                    rankdrop.engine().submit("race", "P1", value, None).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(rankdrop.entry_count("race").unwrap(), 1);
    let top = rankdrop.query().top_n("race", 1).unwrap();
    assert_eq!(top[0].entry.score_value, (THREADS * PER_THREAD - 1) as f64);
}

#[test]
fn test_concurrent_first_submissions_one_row_each() {
    let rankdrop = shared(ScoreStrategy::BestOnly);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let rankdrop = Arc::clone(&rankdrop);
            thread::spawn(move || {
                for p in 0..50 {
                    rankdrop
                        .engine()
                        .submit("race", &format!("P{p}"), t as f64, None)
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(rankdrop.entry_count("race").unwrap(), 50);
    let page = rankdrop.query().page("race", 0, 100).unwrap();
    assert!(page.entries.iter().all(|r| r.entry.score_value == (THREADS - 1) as f64));
}

#[test]
fn test_reads_during_writes_stay_consistent() {
    let rankdrop = shared(ScoreStrategy::MultipleEntries);

    let writer = {
        let rankdrop = Arc::clone(&rankdrop);
        thread::spawn(move || {
            for i in 0..1000 {
                rankdrop.engine().submit("race", "W", f64::from(i), None).unwrap();
            }
        })
    };

    for _ in 0..200 {
        let top = rankdrop.query().top_n("race", 100).unwrap();
        for (i, row) in top.iter().enumerate() {
            assert_eq!(row.rank, i as u64 + 1);
        }
        for pair in top.windows(2) {
            assert!(pair[0].entry.score_value >= pair[1].entry.score_value);
        }
    }
    writer.join().unwrap();

    let top = rankdrop.query().top_n("race", 1).unwrap();
    assert_eq!(top[0].entry.score_value, 999.0);
}
