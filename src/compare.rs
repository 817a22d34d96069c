//! Positional comparison of two resolved layer sequences.
//!
//! Alignment is strictly by index: layer `i` of the base image is compared
//! with layer `i` of the target image, and the shorter sequence is padded
//! with absent sides. A reordered layer therefore shows up as a run of
//! `NotEqual` rows rather than as a move.

use crate::history::LayerInfo;
use serde::Serialize;

/// Verdict for one aligned pair of layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerDiff {
    Equal,
    NotEqual,
    /// Present only in the target.
    Added,
    /// Present only in the base.
    Removed,
}

/// One aligned row. At least one side is always present.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerComparison {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<LayerInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<LayerInfo>,
    pub diff: LayerDiff,
}

impl LayerComparison {
    fn new(base: Option<LayerInfo>, target: Option<LayerInfo>, diff: LayerDiff) -> Self {
        debug_assert!(
            base.is_some() || target.is_some(),
            "comparison row with neither side present"
        );
        Self { base, target, diff }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareSummary {
    /// Every row is `Equal`.
    pub are_equal: bool,
    /// The target contains everything the base has (it may add layers).
    pub target_includes_all_base_layers: bool,
    /// Index of the last layer both images share from the start; `-1` when
    /// they diverge immediately.
    pub last_common_layer_index: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareResult {
    pub summary: CompareSummary,
    pub comparisons: Vec<LayerComparison>,
}

fn digests_match(base: Option<&str>, target: Option<&str>) -> bool {
    match (base, target) {
        (None, None) => true,
        (Some(b), Some(t)) => b.eq_ignore_ascii_case(t),
        _ => false,
    }
}

/// Two present rows are equal when digests match case-insensitively and
/// history texts match exactly. Compressed size never participates.
fn classify(base: &LayerInfo, target: &LayerInfo) -> LayerDiff {
    if digests_match(base.digest.as_deref(), target.digest.as_deref())
        && base.history == target.history
    {
        LayerDiff::Equal
    } else {
        LayerDiff::NotEqual
    }
}

fn summarize(comparisons: &[LayerComparison]) -> CompareSummary {
    let are_equal = comparisons.iter().all(|c| c.diff == LayerDiff::Equal);
    let target_includes_all_base_layers = are_equal
        || !comparisons
            .iter()
            .any(|c| matches!(c.diff, LayerDiff::NotEqual | LayerDiff::Removed));
    let last_common_layer_index = if are_equal {
        comparisons.len() as i64 - 1
    } else {
        comparisons
            .iter()
            .take_while(|c| c.diff == LayerDiff::Equal)
            .count() as i64
            - 1
    };
    CompareSummary {
        are_equal,
        target_includes_all_base_layers,
        last_common_layer_index,
    }
}

/// Compares two resolved sequences position by position.
pub fn compare_layers(base: &[LayerInfo], target: &[LayerInfo]) -> CompareResult {
    let len = base.len().max(target.len());
    let mut comparisons = Vec::with_capacity(len);
    for i in 0..len {
        let row = match (base.get(i), target.get(i)) {
            (Some(b), Some(t)) => {
                LayerComparison::new(Some(b.clone()), Some(t.clone()), classify(b, t))
            }
            (None, Some(t)) => LayerComparison::new(None, Some(t.clone()), LayerDiff::Added),
            (Some(b), None) => LayerComparison::new(Some(b.clone()), None, LayerDiff::Removed),
            (None, None) => unreachable!("loop is bounded by the longer sequence"),
        };
        comparisons.push(row);
    }
    let summary = summarize(&comparisons);
    CompareResult {
        summary,
        comparisons,
    }
}
