//! Comparison of expected heights against what storage actually holds.

use std::collections::BTreeMap;

/// Outcome of one reconciliation scan over `start..=end`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub start: u64,
    pub end: u64,
    /// Heights in range with no stored copy
    pub missing: Vec<u64>,
    /// Heights stored more often than the redundancy target
    pub excessive: Vec<u64>,
    /// Heights stored fewer times than the target; only computed when the
    /// target is above one, and never repaired
    pub insufficient: Vec<u64>,
}

impl ReconciliationReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Classify every height in `start..=end` against `histogram`.
///
/// Histogram entries outside the range are ignored. An empty range yields an
/// empty report.
pub fn analyze(
    start: u64,
    end: u64,
    histogram: &BTreeMap<u64, u32>,
    redundancy: u32,
) -> ReconciliationReport {
    let mut report = ReconciliationReport {
        start,
        end,
        ..Default::default()
    };
    if start > end {
        return report;
    }

    let mut expected = start;
    for (&height, &count) in histogram.range(start..=end) {
        if count == 0 {
            continue;
        }
        report.missing.extend(expected..height);
        expected = height + 1;

        if count > redundancy {
            report.excessive.push(height);
        } else if redundancy > 1 && count < redundancy {
            report.insufficient.push(height);
        }
    }
    if expected <= end {
        report.missing.extend(expected..=end);
    }
    report
}
