//! Merge and statistics tests over whole histories

mod common;

use std::collections::HashSet;

use common::history;
use proptest::prelude::*;
use warplog::models::PullRecord;
use warplog::stats;
use warplog::storage::merge::is_sorted_newest_first;
use warplog::storage::{PersistedStore, RecordMerger};

/// Empty history plus 23 pulls with top-rarity hits at 5 and 19
#[test]
fn test_first_fetch_merge_and_stats() {
    let mut store = PersistedStore::new();
    let accepted = store.merge("11", "Limited character", history(23, &[5, 19]));
    assert_eq!(accepted, 23);

    let stats = store.history("11").unwrap().stats();
    assert_eq!(stats.total, 23);
    assert_eq!(stats.pity, 5);
    assert_eq!(stats.intervals, vec![14]);
    assert_eq!(stats.count(5), 2);
    assert_eq!(stats.count(3), 21);
}

/// Overlapping fetches only add the new pulls
#[test]
fn test_incremental_fetch() {
    let full = history(30, &[3, 20]);
    let mut store = PersistedStore::new();

    // older 25 pulls first, then a fetch that overlaps with them
    assert_eq!(store.merge("11", "Limited character", full[5..].to_vec()), 25);
    assert_eq!(store.merge("11", "Limited character", full[..10].to_vec()), 5);

    let history = store.history("11").unwrap();
    assert_eq!(history.records(), full.as_slice());
    assert_eq!(history.stats().pity, 3);
    assert_eq!(history.stats().intervals, vec![17]);
}

fn arb_record() -> impl Strategy<Value = PullRecord> {
    (0u32..30, 0usize..4, 0u32..40, 3u8..=5).prop_map(|(id, name, minute, rank)| {
        let names = ["Himeko", "Welt", "Bronya", ""];
        let id = if id == 0 { String::new() } else { format!("{:019}", 1_700_000_000_000_000_000u64 + u64::from(id)) };
        PullRecord::new(id, names[name], rank, format!("2024-05-01 12:{minute:02}:00"), "11")
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Identity keys stay unique and the order stays newest first
    #[test]
    fn prop_merge_keeps_invariants(
        first in prop::collection::vec(arb_record(), 0..40),
        second in prop::collection::vec(arb_record(), 0..40),
    ) {
        let mut records = Vec::new();
        let a = RecordMerger::merge(&mut records, first.clone());
        let b = RecordMerger::merge(&mut records, second);

        prop_assert_eq!(a + b, records.len());
        prop_assert!(is_sorted_newest_first(&records));

        let keys: HashSet<_> = records.iter().map(PullRecord::identity_key).collect();
        prop_assert_eq!(keys.len(), records.len());
        prop_assert!(records.iter().all(|r| !r.identity_key().is_degenerate()));

        // idempotent
        prop_assert_eq!(RecordMerger::merge(&mut records, first), 0);
    }

    /// Pity counts the pulls newer than the newest top-rarity pull
    #[test]
    fn prop_pity_matches_newest_top(ranks in prop::collection::vec(3u8..=5, 0..80)) {
        let records: Vec<PullRecord> = ranks
            .iter()
            .enumerate()
            .map(|(i, rank)| PullRecord::new(i.to_string(), "x", *rank, "2024-05-01 12:00:00", "1"))
            .collect();

        let stats = stats::compute(&records);
        let newest_top = ranks.iter().position(|r| *r == 5);

        prop_assert_eq!(stats.pity, newest_top.unwrap_or(ranks.len()));
        prop_assert_eq!(stats.total, ranks.len());
        prop_assert_eq!(stats.top_hits.len(), ranks.iter().filter(|r| **r == 5).count());
        prop_assert_eq!(stats.intervals.len(), stats.top_hits.len().saturating_sub(1));
        prop_assert_eq!(stats.high_hits.len(), ranks.iter().filter(|r| **r == 4).count());
        prop_assert_eq!(stats.tiers.values().sum::<usize>(), ranks.len());
    }
}
