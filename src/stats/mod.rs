//! Pull statistics
//!
//! Derived numbers for one banner's history:
//! - Rarity tier counts and rates
//! - Pity: pulls since the last top-rarity result
//! - Intervals between consecutive top-rarity results
//! - The 5-star and 4-star results themselves
//!
//! Histories are stored newest first. The pass walks them from the oldest end
//! so the running counter measures pulls made *after* each top-rarity hit.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{PullRecord, HIGH_RANK, TOP_RANK};

/// One top-rarity result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopHit {
    pub name: String,
    pub time: String,
    /// Pulls it took, counting the hit itself
    pub pulls: usize,
}

/// One 4-star result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighHit {
    pub name: String,
    pub time: String,
}

/// Statistics for one banner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub total: usize,

    /// Count per rank
    pub tiers: BTreeMap<u8, usize>,

    /// Pulls since the most recent top-rarity result
    pub pity: usize,

    /// Index distance between consecutive top-rarity results, oldest first
    pub intervals: Vec<usize>,

    /// Top-rarity results, oldest first
    pub top_hits: Vec<TopHit>,

    /// 4-star results, oldest first
    pub high_hits: Vec<HighHit>,
}

/// Compute statistics for a newest-first history
pub fn compute(records: &[PullRecord]) -> Stats {
    let mut stats = Stats {
        total: records.len(),
        ..Stats::default()
    };
    let mut last_top: Option<usize> = None;

    for (index, record) in records.iter().enumerate().rev() {
        *stats.tiers.entry(record.rank()).or_insert(0) += 1;

        if record.rank() == TOP_RANK {
            if let Some(previous) = last_top {
                stats.intervals.push(previous - index);
            }
            stats.top_hits.push(TopHit {
                name: record.name().to_string(),
                time: record.time().to_string(),
                pulls: stats.pity + 1,
            });
            last_top = Some(index);
            stats.pity = 0;
        } else {
            if record.rank() == HIGH_RANK {
                stats.high_hits.push(HighHit {
                    name: record.name().to_string(),
                    time: record.time().to_string(),
                });
            }
            stats.pity += 1;
        }
    }

    stats
}

impl Stats {
    /// No pulls recorded
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn count(&self, rank: u8) -> usize {
        self.tiers.get(&rank).copied().unwrap_or(0)
    }

    /// Share of pulls at `rank`, in percent
    pub fn percentage(&self, rank: u8) -> f64 {
        percent(self.count(rank), self.total)
    }

    pub fn min_interval(&self) -> Option<usize> {
        self.intervals.iter().min().copied()
    }

    pub fn max_interval(&self) -> Option<usize> {
        self.intervals.iter().max().copied()
    }

    pub fn average_interval(&self) -> Option<f64> {
        if self.intervals.is_empty() {
            return None;
        }
        let sum: usize = self.intervals.iter().sum();
        Some(sum as f64 / self.intervals.len() as f64)
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "  no data");
        }

        writeln!(f, "  total pulls: {}", self.total)?;
        for (rank, count) in self.tiers.iter().rev() {
            writeln!(f, "  {rank}-star: {count} ({:.2}%)", self.percentage(*rank))?;
        }
        writeln!(f, "  pity: {}", self.pity)?;

        if let (Some(min), Some(max), Some(avg)) =
            (self.min_interval(), self.max_interval(), self.average_interval())
        {
            writeln!(f, "  top-rarity interval: min {min}, max {max}, avg {avg:.1}")?;
        }

        for hit in self.top_hits.iter().rev() {
            writeln!(f, "  {} {} ({} pulls)", hit.time, hit.name, hit.pulls)?;
        }
        if !self.high_hits.is_empty() {
            writeln!(f, "  {HIGH_RANK}-star results:")?;
            for hit in self.high_hits.iter().rev() {
                writeln!(f, "    {} {}", hit.time, hit.name)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Summary
// ============================================================================

/// One banner's line in a [`Summary`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryLine {
    pub banner: String,
    pub name: String,
    pub total: usize,
    pub top: usize,
    pub pity: usize,
}

/// Totals across banners
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub tiers: BTreeMap<u8, usize>,
    pub lines: Vec<SummaryLine>,
}

impl Summary {
    /// Build from `(banner id, display name, stats)` entries, keeping their order
    pub fn from_stats<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str, &'a Stats)>) -> Self {
        let mut summary = Self::default();

        for (banner, name, stats) in entries {
            summary.total += stats.total;
            for (rank, count) in &stats.tiers {
                *summary.tiers.entry(*rank).or_insert(0) += count;
            }
            summary.lines.push(SummaryLine {
                banner: banner.to_string(),
                name: name.to_string(),
                total: stats.total,
                top: stats.count(TOP_RANK),
                pity: stats.pity,
            });
        }

        summary
    }

    pub fn percentage(&self, rank: u8) -> f64 {
        percent(self.tiers.get(&rank).copied().unwrap_or(0), self.total)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total pulls: {}", self.total)?;
        for (rank, count) in self.tiers.iter().rev() {
            writeln!(f, "  {rank}-star: {count} ({:.2}%)", self.percentage(*rank))?;
        }
        for line in &self.lines {
            writeln!(
                f,
                "  [{}] {}: {} pulls, {} top-rarity, pity {}",
                line.banner, line.name, line.total, line.top, line.pity
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Newest-first history with top-rarity pulls at the given indices
    fn history(len: usize, tops: &[usize]) -> Vec<PullRecord> {
        (0..len)
            .map(|i| {
                let rank = if tops.contains(&i) { 5 } else if i % 7 == 0 { 4 } else { 3 };
                let time = format!("2024-01-01 00:{:02}:00", 59 - i);
                PullRecord::new(format!("{}", 1000 - i), format!("item{i}"), rank, time, "11")
            })
            .collect()
    }

    #[test]
    fn test_pity_and_intervals() {
        let stats = compute(&history(23, &[5, 19]));

        assert_eq!(stats.total, 23);
        assert_eq!(stats.count(5), 2);
        assert_eq!(stats.pity, 5);
        assert_eq!(stats.intervals, vec![14]);
        assert_eq!(stats.top_hits.len(), 2);
        assert_eq!(stats.top_hits[0].name, "item19");
        assert_eq!(stats.top_hits[0].pulls, 4);
        assert_eq!(stats.top_hits[1].pulls, 14);
    }

    #[test]
    fn test_high_hits_oldest_first() {
        let stats = compute(&history(23, &[5, 19]));

        // ranks 4 at 0, 7, 14, 21; index 5 and 19 are tops
        assert_eq!(stats.high_hits.len(), 4);
        assert_eq!(stats.high_hits.len(), stats.count(HIGH_RANK));
        assert_eq!(stats.high_hits[0].name, "item21");
        assert_eq!(stats.high_hits[3].name, "item0");
        assert_eq!(stats.high_hits[3].time, "2024-01-01 00:59:00");

        let shown = stats.to_string();
        assert!(shown.contains("4-star results:"));
        assert!(shown.contains("    2024-01-01 00:59:00 item0"));
    }

    #[test]
    fn test_stats_without_high_hits_still_load() {
        let json = r#"{"total":1,"tiers":{"5":1},"pity":0,"intervals":[],"top_hits":[]}"#;
        let stats: Stats = serde_json::from_str(json).unwrap();
        assert!(stats.high_hits.is_empty());
        assert!(!stats.to_string().contains("4-star results"));
    }

    #[test]
    fn test_empty() {
        let stats = compute(&[]);
        assert!(stats.is_empty());
        assert_eq!(stats.pity, 0);
        assert_eq!(stats.percentage(5), 0.0);
        assert_eq!(stats.average_interval(), None);
    }

    #[test]
    fn test_pity_zero_after_newest_top() {
        let stats = compute(&history(10, &[0]));
        assert_eq!(stats.pity, 0);
        assert!(stats.intervals.is_empty());
    }

    #[test]
    fn test_interval_summary() {
        let stats = compute(&history(40, &[1, 11, 31]));
        assert_eq!(stats.intervals, vec![20, 10]);
        assert_eq!(stats.min_interval(), Some(10));
        assert_eq!(stats.max_interval(), Some(20));
        assert_eq!(stats.average_interval(), Some(15.0));
    }

    #[test]
    fn test_percentages_sum_to_hundred() {
        let stats = compute(&history(23, &[5, 19]));
        let sum: f64 = stats.tiers.keys().map(|rank| stats.percentage(*rank)).sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_totals() {
        let a = compute(&history(10, &[2]));
        let b = compute(&history(5, &[]));
        let summary = Summary::from_stats([("11", "Limited", &a), ("1", "Standard", &b)]);

        assert_eq!(summary.total, 15);
        assert_eq!(summary.tiers.get(&5), Some(&1));
        assert_eq!(summary.lines.len(), 2);
        assert_eq!(summary.lines[0].top, 1);
        assert_eq!(summary.lines[1].pity, 5);
        assert!(summary.to_string().contains("[1] Standard: 5 pulls"));
    }
}
