//! Scroll offset mapping through a direction table.

use super::anchors::{AnchorTable, ScrollExtent};

/// Map `source_y` through `table`.
///
/// Empty tables map everything to 0 and a single entry maps everything to its
/// target. Otherwise queries outside the table clamp to the boundary entries
/// and queries inside are linearly interpolated between the bracketing pair.
/// A query equal to an entry's `source_y` returns that entry's `target_y`
/// exactly.
pub fn map(table: &AnchorTable, source_y: f32) -> f32 {
    let entries = table.entries();
    let (first, last) = match (entries.first(), entries.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return 0.0,
    };
    if entries.len() == 1 {
        return first.target_y;
    }

    let y = if source_y.is_finite() { source_y } else { first.source_y };
    if y <= first.source_y {
        return first.target_y;
    }
    if y >= last.source_y {
        return last.target_y;
    }

    // First entry strictly past the query; 1..len by the checks above.
    let upper = entries.partition_point(|a| a.source_y <= y);
    let lo = &entries[upper - 1];
    let hi = &entries[upper];

    let span = hi.source_y - lo.source_y;
    if span <= 0.0 {
        return hi.target_y;
    }
    let t = (y - lo.source_y) / span;
    lo.target_y + (hi.target_y - lo.target_y) * t
}

/// Proportional mapping between two extents.
pub fn ratio(source_y: f32, source: ScrollExtent, target: ScrollExtent) -> f32 {
    if source.max_scrollable <= 0.0 {
        return 0.0;
    }
    let y = source.clamp(source_y);
    target.clamp((y / source.max_scrollable) * target.max_scrollable)
}

/// Map a live scroll offset, falling back to [`ratio`] while the table holds
/// fewer than two anchors (before the first successful collection).
pub fn map_scroll(
    table: &AnchorTable,
    source_y: f32,
    source: ScrollExtent,
    target: ScrollExtent,
) -> f32 {
    if table.len() < 2 {
        return ratio(source_y, source, target);
    }
    target.clamp(map(table, source_y))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
