//! Anchor data model shared by the collector, builder, mapper and scheduler.

use serde::Serialize;

// ─────────────────────────────────────────────────────────────────────────────
// Pane
// ─────────────────────────────────────────────────────────────────────────────

/// One side of the split view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pane {
    /// The plain-text source buffer
    Editor,
    /// The rendered preview
    Preview,
}

impl Pane {
    /// The passive side when this pane is the scroll source.
    pub fn other(self) -> Self {
        match self {
            Pane::Editor => Pane::Preview,
            Pane::Preview => Pane::Editor,
        }
    }

    /// Get a display label for the pane.
    pub fn label(self) -> &'static str {
        match self {
            Pane::Editor => "Editor",
            Pane::Preview => "Preview",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Samples and Table Entries
// ─────────────────────────────────────────────────────────────────────────────

/// One observed correspondence between the two scroll spaces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawAnchorSample {
    pub editor_y: f32,
    pub preview_y: f32,
}

impl RawAnchorSample {
    pub fn new(editor_y: f32, preview_y: f32) -> Self {
        Self { editor_y, preview_y }
    }

    /// Project the sample onto the axes of a table whose source is `source`.
    pub fn project(&self, source: Pane) -> DirectionAnchor {
        match source {
            Pane::Editor => DirectionAnchor::new(self.editor_y, self.preview_y),
            Pane::Preview => DirectionAnchor::new(self.preview_y, self.editor_y),
        }
    }
}

/// A single entry of a direction table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DirectionAnchor {
    pub source_y: f32,
    pub target_y: f32,
}

impl DirectionAnchor {
    pub fn new(source_y: f32, target_y: f32) -> Self {
        Self { source_y, target_y }
    }
}

/// Ordered, monotonic mapping from one pane's scroll space to the other's.
///
/// Only [`build`](super::build) produces non-empty tables, so the ordering
/// invariants hold for every table the scheduler holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AnchorTable {
    entries: Vec<DirectionAnchor>,
}

impl AnchorTable {
    /// An empty table (maps everything to 0).
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn from_sorted(entries: Vec<DirectionAnchor>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[DirectionAnchor] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first(&self) -> Option<&DirectionAnchor> {
        self.entries.first()
    }

    pub fn last(&self) -> Option<&DirectionAnchor> {
        self.entries.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirectionAnchor> {
        self.entries.iter()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scroll Extent
// ─────────────────────────────────────────────────────────────────────────────

/// How far a pane can scroll: content height minus viewport height.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScrollExtent {
    pub max_scrollable: f32,
}

impl ScrollExtent {
    pub fn new(max_scrollable: f32) -> Self {
        let max_scrollable = if max_scrollable.is_finite() {
            max_scrollable.max(0.0)
        } else {
            0.0
        };
        Self { max_scrollable }
    }

    /// Derive the extent from a rendered content height and a viewport height.
    pub fn from_heights(content_height: f32, viewport_height: f32) -> Self {
        Self::new(content_height - viewport_height)
    }

    /// Clamp an offset into `[0, max_scrollable]`.
    pub fn clamp(&self, y: f32) -> f32 {
        if !y.is_finite() {
            return 0.0;
        }
        y.clamp(0.0, self.max_scrollable)
    }
}

/// Extents of both panes, captured at rebuild time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PaneExtents {
    pub editor: ScrollExtent,
    pub preview: ScrollExtent,
}

impl PaneExtents {
    pub fn get(&self, pane: Pane) -> ScrollExtent {
        match pane {
            Pane::Editor => self.editor,
            Pane::Preview => self.preview,
        }
    }
}
