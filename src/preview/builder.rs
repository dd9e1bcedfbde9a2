//! Direction table construction
//!
//! Turns the raw samples observed by the collector into a monotonic,
//! boundary-pinned table for one scroll direction. The same samples feed both
//! directions with their axes swapped; each table is enforced independently.

use super::anchors::{AnchorTable, DirectionAnchor, Pane, PaneExtents, RawAnchorSample};

/// Build the table for scrolls originating on `source`.
pub fn build_direction(
    samples: &[RawAnchorSample],
    source: Pane,
    extents: PaneExtents,
) -> AnchorTable {
    let points: Vec<DirectionAnchor> = samples.iter().map(|s| s.project(source)).collect();
    build(
        &points,
        extents.get(source).max_scrollable,
        extents.get(source.other()).max_scrollable,
    )
}

/// Build a direction table from `(source_y, target_y)` points.
///
/// The result always starts at `{0, 0}` and ends at `{source_max, target_max}`,
/// has strictly ascending `source_y` and non-decreasing `target_y`. Identical
/// inputs produce identical tables.
///
/// A source pane that cannot scroll (`source_max == 0`) yields the single
/// entry `{0, 0}`.
pub fn build(points: &[DirectionAnchor], source_max: f32, target_max: f32) -> AnchorTable {
    let source_max = sanitize_max(source_max);
    let target_max = sanitize_max(target_max);

    if source_max <= 0.0 {
        return AnchorTable::from_sorted(vec![DirectionAnchor::new(0.0, 0.0)]);
    }

    let mut entries: Vec<DirectionAnchor> = points
        .iter()
        .filter(|p| is_usable(p.source_y) && is_usable(p.target_y))
        .map(|p| {
            DirectionAnchor::new(
                clamp_axis(p.source_y, source_max),
                clamp_axis(p.target_y, target_max),
            )
        })
        .collect();

    entries.push(DirectionAnchor::new(0.0, 0.0));
    entries.push(DirectionAnchor::new(source_max, target_max));

    sort_by_source(&mut entries);
    let mut entries = collapse_duplicates(entries);
    enforce_monotonic(&mut entries);

    pin(&mut entries, 0.0, 0.0);
    pin(&mut entries, source_max, target_max);

    // Pinning can locally break ordering; repeat both passes.
    sort_by_source(&mut entries);
    enforce_monotonic(&mut entries);

    AnchorTable::from_sorted(entries)
}

fn sanitize_max(max: f32) -> f32 {
    if max.is_finite() {
        max.max(0.0)
    } else {
        0.0
    }
}

fn is_usable(v: f32) -> bool {
    v.is_finite() && v >= 0.0
}

/// Clamp into `[0, max]`; the `+ 0.0` folds `-0.0` into `0.0` so it groups
/// with the synthetic origin.
fn clamp_axis(v: f32, max: f32) -> f32 {
    v.min(max) + 0.0
}

fn sort_by_source(entries: &mut [DirectionAnchor]) {
    entries.sort_by(|a, b| a.source_y.total_cmp(&b.source_y));
}

/// Merge runs of equal `source_y`, keeping the largest `target_y`.
fn collapse_duplicates(entries: Vec<DirectionAnchor>) -> Vec<DirectionAnchor> {
    let mut out: Vec<DirectionAnchor> = Vec::with_capacity(entries.len());
    for entry in entries {
        match out.last_mut() {
            Some(last) if last.source_y == entry.source_y => {
                last.target_y = last.target_y.max(entry.target_y);
            }
            _ => out.push(entry),
        }
    }
    out
}

fn enforce_monotonic(entries: &mut [DirectionAnchor]) {
    for i in 1..entries.len() {
        if entries[i].target_y < entries[i - 1].target_y {
            entries[i].target_y = entries[i - 1].target_y;
        }
    }
}

fn pin(entries: &mut Vec<DirectionAnchor>, source_y: f32, target_y: f32) {
    match entries.iter_mut().find(|e| e.source_y == source_y) {
        Some(entry) => entry.target_y = target_y,
        None => entries.push(DirectionAnchor::new(source_y, target_y)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
