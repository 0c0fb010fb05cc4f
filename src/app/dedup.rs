//! Identifier-uniqueness guard applied whenever pages are folded into the list.
//!
//! A non-zero removal count means the loader returned overlapping pages.

use std::collections::HashSet;
use std::sync::Arc;

use crate::mail::EmailSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Replace the list with the incoming page
    Reset,
    /// Keep existing items and add unseen incoming ones after them
    Append,
}

/// Sizes before and after deduplication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub original: usize,
    pub deduplicated: usize,
}

impl MergeReport {
    pub fn removed(&self) -> usize {
        self.original - self.deduplicated
    }
}

/// Merge `incoming` into `existing`, keeping the first occurrence of every id.
/// On append, items already in `existing` win over stale copies in `incoming`.
pub fn merge(
    existing: &[Arc<EmailSummary>],
    incoming: Vec<Arc<EmailSummary>>,
    mode: MergeMode,
) -> (Vec<Arc<EmailSummary>>, MergeReport) {
    let base: &[Arc<EmailSummary>] = match mode {
        MergeMode::Reset => &[],
        MergeMode::Append => existing,
    };
    let original = base.len() + incoming.len();

    let mut seen: HashSet<String> = HashSet::with_capacity(original);
    let mut merged = Vec::with_capacity(original);
    for item in base.iter().cloned().chain(incoming) {
        if seen.insert(item.id.clone()) {
            merged.push(item);
        }
    }

    let report = MergeReport {
        original,
        deduplicated: merged.len(),
    };
    if report.removed() > 0 {
        tracing::warn!(
            "Dropped {} duplicate items while merging ({:?}): {} -> {}",
            report.removed(),
            mode,
            report.original,
            report.deduplicated
        );
    }
    (merged, report)
}
