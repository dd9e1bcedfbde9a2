//! Interfaces consumed from the host's editor and preview collaborators.
//!
//! The engine never owns a widget toolkit. A host (an egui split view, a
//! webview bridge, the headless [`crate::layout`] model) implements these
//! traits and hands boxed handles to the scheduler.

use std::cell::RefCell;
use std::rc::Rc;

use super::anchors::ScrollExtent;

/// A scrollable container.
pub trait ScrollPane {
    /// Whether the handle still refers to a mounted pane.
    fn is_attached(&self) -> bool {
        true
    }

    /// Current vertical scroll offset in pixels.
    fn scroll_top(&self) -> f32;

    /// Move the pane. Implementations clamp to their own extent.
    fn set_scroll_top(&mut self, top: f32);

    /// Current scrollable extent (content height minus viewport height).
    fn extent(&self) -> ScrollExtent;
}

/// Vertical bounds of a rendered element, in the surface's viewport space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeRect {
    pub top: f32,
    pub bottom: f32,
}

impl NodeRect {
    pub fn new(top: f32, bottom: f32) -> Self {
        Self { top, bottom }
    }
}

/// A rendered block as seen by the collector.
///
/// Every field is optional: renderers propagate markers onto descendants,
/// drop positions for synthesized nodes, or have not laid an element out yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorNode {
    /// Per-render sequence index; nodes without one are not anchors
    pub sequence: Option<u64>,
    /// Start line in source (1-indexed)
    pub start_line: Option<usize>,
    /// Start character offset in source (0-indexed)
    pub start_offset: Option<usize>,
    /// End line in source (1-indexed)
    pub end_line: Option<usize>,
    /// End character offset in source (0-indexed)
    pub end_offset: Option<usize>,
    /// Rendered bounds, if the element has been laid out
    pub rect: Option<NodeRect>,
}

/// The realized preview.
pub trait PreviewSurface: ScrollPane {
    /// Viewport-space top of the content root; node rects are made
    /// document-relative by subtracting it.
    fn content_origin(&self) -> f32 {
        -self.scroll_top()
    }

    /// Anchor-bearing nodes in document order. May contain duplicates.
    fn anchor_nodes(&self) -> Vec<AnchorNode>;
}

/// Top and bottom of a line in the editor's document space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineBlock {
    pub top: f32,
    pub bottom: f32,
}

impl LineBlock {
    pub fn new(top: f32, bottom: f32) -> Self {
        Self { top, bottom }
    }
}

/// The text buffer's layout query capability.
pub trait TextBuffer {
    /// Stale handles (after a remount) answer no queries.
    fn is_stale(&self) -> bool {
        false
    }

    /// Layout of a 1-based line.
    fn line_block(&self, line: usize) -> Option<LineBlock>;

    /// Layout of the line containing a 0-based character offset.
    fn offset_block(&self, offset: usize) -> Option<LineBlock>;

    /// Total character count, used to detect large content changes.
    fn char_count(&self) -> usize;
}

/// Host callback that re-queries the editing surface for a fresh buffer
/// handle after the previous one went stale.
pub type BufferRequery = Box<dyn FnMut() -> Option<Box<dyn TextBuffer>>>;

// ─────────────────────────────────────────────────────────────────────────────
// Shared Handles
// ─────────────────────────────────────────────────────────────────────────────
//
// Hosts usually keep their own handle to a pane while the scheduler holds
// another one, so the traits are forwarded through `Rc<RefCell<_>>`.

impl<T: ScrollPane + ?Sized> ScrollPane for Rc<RefCell<T>> {
    fn is_attached(&self) -> bool {
        self.borrow().is_attached()
    }

    fn scroll_top(&self) -> f32 {
        self.borrow().scroll_top()
    }

    fn set_scroll_top(&mut self, top: f32) {
        self.borrow_mut().set_scroll_top(top);
    }

    fn extent(&self) -> ScrollExtent {
        self.borrow().extent()
    }
}

impl<T: PreviewSurface + ?Sized> PreviewSurface for Rc<RefCell<T>> {
    fn content_origin(&self) -> f32 {
        self.borrow().content_origin()
    }

    fn anchor_nodes(&self) -> Vec<AnchorNode> {
        self.borrow().anchor_nodes()
    }
}

impl<T: TextBuffer + ?Sized> TextBuffer for Rc<RefCell<T>> {
    fn is_stale(&self) -> bool {
        self.borrow().is_stale()
    }

    fn line_block(&self, line: usize) -> Option<LineBlock> {
        self.borrow().line_block(line)
    }

    fn offset_block(&self, offset: usize) -> Option<LineBlock> {
        self.borrow().offset_block(offset)
    }

    fn char_count(&self) -> usize {
        self.borrow().char_count()
    }
}
