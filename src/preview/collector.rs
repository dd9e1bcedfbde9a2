//! Anchor collection from the realized preview and the text buffer.
//!
//! Each rendered block that carries a sequence marker is paired with the
//! editor position of its source line. Blocks spanning several lines give a
//! second sample for their bottom edge so tall blocks (equations, fenced code)
//! cannot be skipped over by interpolation.

use std::collections::HashSet;

use log::{debug, trace};

use super::anchors::{PaneExtents, RawAnchorSample};
use super::surface::{AnchorNode, LineBlock, NodeRect, PreviewSurface, TextBuffer};
use crate::error::{Error, Result};

/// Collect raw samples for every resolvable anchor node.
///
/// Nodes are de-duplicated by sequence index, first occurrence wins.
/// Unresolvable nodes are skipped.
pub fn collect(
    preview: &dyn PreviewSurface,
    buffer: &dyn TextBuffer,
    extents: PaneExtents,
) -> Vec<RawAnchorSample> {
    let origin = preview.content_origin();
    let nodes = preview.anchor_nodes();

    let mut seen = HashSet::with_capacity(nodes.len());
    let mut samples = Vec::with_capacity(nodes.len() * 2);
    let mut skipped = 0usize;

    for node in &nodes {
        let Some(sequence) = node.sequence else {
            continue;
        };
        if !seen.insert(sequence) {
            continue;
        }
        match resolve_node(node, sequence, buffer, origin, extents) {
            Ok(resolved) => samples.extend(resolved),
            Err(err) => {
                trace!("Skipping anchor: {}", err);
                skipped += 1;
            }
        }
    }

    debug!(
        "Collected {} samples from {} anchors ({} skipped)",
        samples.len(),
        seen.len(),
        skipped
    );
    samples
}

/// Resolve one node into one or two samples.
fn resolve_node(
    node: &AnchorNode,
    sequence: u64,
    buffer: &dyn TextBuffer,
    origin: f32,
    extents: PaneExtents,
) -> Result<Vec<RawAnchorSample>> {
    let missing = || Error::MissingAnchor { sequence };

    let start = resolve_block(buffer, node.start_line, node.start_offset).ok_or_else(missing)?;
    let rect = node.rect.ok_or_else(missing)?;
    if !rect.top.is_finite() {
        return Err(missing());
    }

    let mut samples = vec![RawAnchorSample::new(
        extents.editor.clamp(start.top),
        extents.preview.clamp(rect.top - origin),
    )];

    if spans_lines(node) {
        if let Some(bottom) = bottom_edge(buffer, node, rect, origin, extents) {
            samples.push(bottom);
        }
    }

    Ok(samples)
}

/// Line numbers survive edits above the block better than offsets, so they
/// are tried first.
fn resolve_block(
    buffer: &dyn TextBuffer,
    line: Option<usize>,
    offset: Option<usize>,
) -> Option<LineBlock> {
    line.and_then(|l| buffer.line_block(l))
        .or_else(|| offset.and_then(|o| buffer.offset_block(o)))
        .filter(|block| block.top.is_finite() && block.bottom.is_finite())
}

/// Whether the node has an end position distinct from its start.
fn spans_lines(node: &AnchorNode) -> bool {
    match (node.start_line, node.end_line) {
        (Some(start), Some(end)) => end != start,
        _ => match (node.start_offset, node.end_offset) {
            (Some(start), Some(end)) => end != start,
            _ => false,
        },
    }
}

fn bottom_edge(
    buffer: &dyn TextBuffer,
    node: &AnchorNode,
    rect: NodeRect,
    origin: f32,
    extents: PaneExtents,
) -> Option<RawAnchorSample> {
    // Offsets are exclusive at the end; step back onto the last character.
    let end_offset = node.end_offset.map(|o| o.saturating_sub(1));
    let end = resolve_block(buffer, node.end_line, end_offset)?;
    if !rect.bottom.is_finite() || rect.bottom <= rect.top {
        return None;
    }
    Some(RawAnchorSample::new(
        extents.editor.clamp(end.bottom),
        extents.preview.clamp(rect.bottom - origin),
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
