//! Record merging
//!
//! Incoming pulls are appended to a banner's history unless their identity
//! key is already present or carries no information. The history is then
//! re-sorted newest first.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::{IdentityKey, PullRecord};

/// Merges fetched pulls into a stored history
pub struct RecordMerger;

impl RecordMerger {
    /// Append unseen records from `incoming` and re-sort `history`
    ///
    /// Returns the number of records accepted. Duplicates within `incoming`
    /// are accepted once.
    pub fn merge(history: &mut Vec<PullRecord>, incoming: impl IntoIterator<Item = PullRecord>) -> usize {
        let mut seen: HashSet<IdentityKey> = history.iter().map(PullRecord::identity_key).collect();
        let before = history.len();
        let mut skipped = 0usize;

        for record in incoming {
            let key = record.identity_key();
            if key.is_degenerate() || !seen.insert(key) {
                skipped += 1;
                continue;
            }
            history.push(record);
        }

        let accepted = history.len() - before;
        if accepted > 0 {
            sort_newest_first(history);
        }

        tracing::debug!(accepted, skipped, total = history.len(), "Merged records");
        accepted
    }
}

/// Order two records newest first by `(time, id)`
///
/// Ids are compared by length first so numeric ids sort numerically.
pub fn newest_first(a: &PullRecord, b: &PullRecord) -> Ordering {
    b.time()
        .cmp(a.time())
        .then_with(|| b.id().len().cmp(&a.id().len()))
        .then_with(|| b.id().cmp(a.id()))
}

pub fn sort_newest_first(records: &mut [PullRecord]) {
    records.sort_by(newest_first);
}

pub fn is_sorted_newest_first(records: &[PullRecord]) -> bool {
    records
        .windows(2)
        .all(|pair| newest_first(&pair[0], &pair[1]) != Ordering::Greater)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, time: &str) -> PullRecord {
        PullRecord::new(id, "Pela", 4, time, "1")
    }

    #[test]
    fn test_merge_sorts_and_counts() {
        let mut history = vec![rec("100", "2024-01-01 10:00:00")];
        let accepted = RecordMerger::merge(
            &mut history,
            vec![
                rec("99", "2024-01-01 09:00:00"),
                rec("101", "2024-01-01 10:00:00"),
                rec("200", "2024-02-01 00:00:00"),
            ],
        );

        assert_eq!(accepted, 3);
        let ids: Vec<&str> = history.iter().map(PullRecord::id).collect();
        assert_eq!(ids, vec!["200", "101", "100", "99"]);
        assert!(is_sorted_newest_first(&history));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let batch = vec![rec("1", "2024-01-01 00:00:00"), rec("2", "2024-01-01 00:00:01")];
        let mut history = Vec::new();

        assert_eq!(RecordMerger::merge(&mut history, batch.clone()), 2);
        assert_eq!(RecordMerger::merge(&mut history, batch), 0);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_duplicates_within_batch_accepted_once() {
        let mut history = Vec::new();
        let accepted = RecordMerger::merge(
            &mut history,
            vec![rec("1", "2024-01-01 00:00:00"), rec("1", "2024-01-01 00:00:00")],
        );
        assert_eq!(accepted, 1);
    }

    #[test]
    fn test_degenerate_key_rejected() {
        let mut history = Vec::new();
        let accepted = RecordMerger::merge(&mut history, vec![PullRecord::new("", "", 3, "", "1")]);
        assert_eq!(accepted, 0);
        assert!(history.is_empty());
    }

    #[test]
    fn test_missing_id_still_distinguished_by_name_and_time() {
        let mut history = Vec::new();
        let accepted = RecordMerger::merge(
            &mut history,
            vec![
                PullRecord::new("", "Arlan", 4, "2024-01-01 00:00:00", "1"),
                PullRecord::new("", "Asta", 4, "2024-01-01 00:00:00", "1"),
            ],
        );
        assert_eq!(accepted, 2);
    }

    #[test]
    fn test_numeric_id_ordering() {
        let mut records = vec![rec("9", "2024-01-01 00:00:00"), rec("10", "2024-01-01 00:00:00")];
        sort_newest_first(&mut records);
        assert_eq!(records[0].id(), "10");
    }
}
