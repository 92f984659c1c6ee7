use std::cmp::Ordering;

use crate::config::SortMode;
use crate::sampler::{ProcessRecord, ProcessSnapshot};

/// Display-side knobs. Owned by the refresh coordinator and mutated only
/// through user actions; everything else reads it.
#[derive(Debug, Clone)]
pub struct ViewState {
    pub search_text: String,
    pub sort_mode: SortMode,
    pub auto_refresh: bool,
}

impl ViewState {
    pub fn new(search_text: String, sort_mode: SortMode, auto_refresh: bool) -> Self {
        Self {
            search_text,
            sort_mode,
            auto_refresh,
        }
    }
}

/// Filtered, sorted, render-ready ordering of one snapshot. Index equals
/// table row.
pub type DisplayList = Vec<ProcessRecord>;

/// Pure transform from a snapshot to its display list: retain records whose
/// name contains the search text case-insensitively, then order descending
/// by the active sort key. The sort is stable so ties keep snapshot order
/// and rows do not shuffle between frames.
pub fn apply(snapshot: &ProcessSnapshot, view: &ViewState) -> DisplayList {
    let needle = view.search_text.trim().to_lowercase();

    let mut rows: DisplayList = snapshot
        .records
        .iter()
        .filter(|record| needle.is_empty() || record.name.to_lowercase().contains(&needle))
        .cloned()
        .collect();

    rows.sort_by(|a, b| compare(a, b, view.sort_mode));
    rows
}

fn compare(a: &ProcessRecord, b: &ProcessRecord, mode: SortMode) -> Ordering {
    let ordering = match mode {
        SortMode::Cpu => a
            .cpu_percent
            .partial_cmp(&b.cpu_percent)
            .unwrap_or(Ordering::Equal),
        SortMode::Mem => a
            .mem_percent
            .partial_cmp(&b.mem_percent)
            .unwrap_or(Ordering::Equal),
    };
    ordering.reverse()
}
