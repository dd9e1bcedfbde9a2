//! Headless layout model for the editor and the preview
//!
//! Gives a markdown document concrete pixel geometry without a UI toolkit:
//! the editor is a fixed line-height text view, the preview is a stack of
//! rendered blocks with estimated heights. Both implement the collaborator
//! traits the sync scheduler consumes, so the CLI and tests can drive the
//! full pipeline.

use log::debug;

use crate::markdown::{AnchorBlock, BlockKind};
use crate::preview::{
    AnchorNode, LineBlock, NodeRect, PreviewSurface, ScrollExtent, ScrollPane, TextBuffer,
};

// ─────────────────────────────────────────────────────────────────────────────
// Editor
// ─────────────────────────────────────────────────────────────────────────────

/// Plain-text editor with one fixed line height.
#[derive(Debug, Clone)]
pub struct EditorLayout {
    /// Character offset of each line start
    line_starts: Vec<usize>,
    char_count: usize,
    line_height: f32,
    viewport_height: f32,
    scroll: f32,
    attached: bool,
    stale: bool,
}

impl EditorLayout {
    pub fn new(text: &str, line_height: f32, viewport_height: f32) -> Self {
        let mut layout = Self {
            line_starts: vec![0],
            char_count: 0,
            line_height: line_height.max(1.0),
            viewport_height: viewport_height.max(0.0),
            scroll: 0.0,
            attached: true,
            stale: false,
        };
        layout.set_text(text);
        layout
    }

    /// Replace the buffer content, keeping the scroll offset within range.
    pub fn set_text(&mut self, text: &str) {
        self.line_starts.clear();
        self.line_starts.push(0);
        let mut count = 0;
        for ch in text.chars() {
            count += 1;
            if ch == '\n' {
                self.line_starts.push(count);
            }
        }
        self.char_count = count;
        self.scroll = self.extent().clamp(self.scroll);
    }

    pub fn set_viewport_height(&mut self, height: f32) {
        self.viewport_height = height.max(0.0);
        self.scroll = self.extent().clamp(self.scroll);
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn line_height(&self) -> f32 {
        self.line_height
    }

    pub fn content_height(&self) -> f32 {
        self.line_count() as f32 * self.line_height
    }

    /// Simulate the view being unmounted.
    pub fn set_attached(&mut self, attached: bool) {
        self.attached = attached;
    }

    /// Simulate the buffer handle going stale after a remount.
    pub fn set_stale(&mut self, stale: bool) {
        self.stale = stale;
    }

    /// 1-based line containing a character offset.
    fn line_of_offset(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|start| *start <= offset)
    }
}

impl ScrollPane for EditorLayout {
    fn is_attached(&self) -> bool {
        self.attached
    }

    fn scroll_top(&self) -> f32 {
        self.scroll
    }

    fn set_scroll_top(&mut self, top: f32) {
        self.scroll = self.extent().clamp(top);
    }

    fn extent(&self) -> ScrollExtent {
        ScrollExtent::from_heights(self.content_height(), self.viewport_height)
    }
}

impl TextBuffer for EditorLayout {
    fn is_stale(&self) -> bool {
        self.stale
    }

    fn line_block(&self, line: usize) -> Option<LineBlock> {
        if line == 0 || line > self.line_count() {
            return None;
        }
        let top = (line - 1) as f32 * self.line_height;
        Some(LineBlock::new(top, top + self.line_height))
    }

    fn offset_block(&self, offset: usize) -> Option<LineBlock> {
        if offset > self.char_count {
            return None;
        }
        self.line_block(self.line_of_offset(offset))
    }

    fn char_count(&self) -> usize {
        self.char_count
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Preview
// ─────────────────────────────────────────────────────────────────────────────

/// Space above the first block.
const CONTENT_PADDING: f32 = 16.0;
/// Vertical gap between consecutive blocks.
const BLOCK_GAP: f32 = 12.0;
/// Body text line height.
const TEXT_LINE: f32 = 22.0;
/// Monospace line height inside code blocks.
const CODE_LINE: f32 = 18.0;
/// Code block inner padding (top + bottom).
const CODE_PADDING: f32 = 24.0;
/// Table row height.
const TABLE_ROW: f32 = 30.0;

/// Estimated rendered height of a block.
fn estimate_height(block: &AnchorBlock) -> f32 {
    let lines = block.line_count() as f32;
    match block.kind {
        BlockKind::Heading(level) => match level {
            1 => 40.0,
            2 => 34.0,
            3 => 28.0,
            4 => 24.0,
            _ => 22.0,
        },
        BlockKind::Paragraph | BlockKind::HtmlBlock => lines * TEXT_LINE,
        BlockKind::CodeBlock => lines * CODE_LINE + CODE_PADDING,
        BlockKind::ThematicBreak => 16.0,
        // The delimiter row is not rendered
        BlockKind::Table => (lines - 1.0).max(1.0) * TABLE_ROW,
    }
}

#[derive(Debug, Clone)]
struct PlacedBlock {
    block: AnchorBlock,
    top: f32,
    height: f32,
}

/// Rendered preview as a vertical stack of blocks.
#[derive(Debug, Clone)]
pub struct PreviewLayout {
    blocks: Vec<PlacedBlock>,
    content_height: f32,
    viewport_height: f32,
    scroll: f32,
    attached: bool,
}

impl PreviewLayout {
    pub fn new(blocks: Vec<AnchorBlock>, viewport_height: f32) -> Self {
        let blocks = blocks
            .into_iter()
            .map(|block| PlacedBlock {
                height: estimate_height(&block),
                block,
                top: 0.0,
            })
            .collect();
        let mut layout = Self {
            blocks,
            content_height: 0.0,
            viewport_height: viewport_height.max(0.0),
            scroll: 0.0,
            attached: true,
        };
        layout.relayout();
        layout
    }

    /// Re-render with a new block list (content edited).
    pub fn set_blocks(&mut self, blocks: Vec<AnchorBlock>) {
        let viewport = self.viewport_height;
        let scroll = self.scroll;
        *self = Self {
            attached: self.attached,
            ..Self::new(blocks, viewport)
        };
        self.scroll = self.extent().clamp(scroll);
    }

    /// Report the settled height of a block (an image or diagram finished
    /// loading). Returns `false` if no block has that sequence index.
    pub fn set_block_height(&mut self, sequence: u64, height: f32) -> bool {
        let Some(placed) = self
            .blocks
            .iter_mut()
            .find(|placed| placed.block.sequence == sequence)
        else {
            return false;
        };
        placed.height = if height.is_finite() { height.max(0.0) } else { 0.0 };
        debug!("Block #{} settled at {:.0}px", sequence, placed.height);
        self.relayout();
        true
    }

    pub fn set_viewport_height(&mut self, height: f32) {
        self.viewport_height = height.max(0.0);
        self.scroll = self.extent().clamp(self.scroll);
    }

    pub fn set_attached(&mut self, attached: bool) {
        self.attached = attached;
    }

    pub fn content_height(&self) -> f32 {
        self.content_height
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Document-space top of a block.
    pub fn block_top(&self, sequence: u64) -> Option<f32> {
        self.blocks
            .iter()
            .find(|placed| placed.block.sequence == sequence)
            .map(|placed| placed.top)
    }

    /// Document-space top of the first heading, e.g. for outline navigation.
    pub fn heading_top(&self, index: usize) -> Option<f32> {
        self.blocks
            .iter()
            .filter(|placed| matches!(placed.block.kind, BlockKind::Heading(_)))
            .nth(index)
            .map(|placed| placed.top)
    }

    fn relayout(&mut self) {
        let mut y = CONTENT_PADDING;
        for placed in &mut self.blocks {
            placed.top = y;
            y += placed.height + BLOCK_GAP;
        }
        self.content_height = y + CONTENT_PADDING;
        self.scroll = self.extent().clamp(self.scroll);
    }
}

impl ScrollPane for PreviewLayout {
    fn is_attached(&self) -> bool {
        self.attached
    }

    fn scroll_top(&self) -> f32 {
        self.scroll
    }

    fn set_scroll_top(&mut self, top: f32) {
        self.scroll = self.extent().clamp(top);
    }

    fn extent(&self) -> ScrollExtent {
        ScrollExtent::from_heights(self.content_height, self.viewport_height)
    }
}

impl PreviewSurface for PreviewLayout {
    fn anchor_nodes(&self) -> Vec<AnchorNode> {
        self.blocks
            .iter()
            .map(|placed| AnchorNode {
                sequence: Some(placed.block.sequence),
                start_line: Some(placed.block.start_line),
                start_offset: Some(placed.block.start_offset),
                end_line: Some(placed.block.end_line),
                end_offset: Some(placed.block.end_offset),
                rect: Some(NodeRect::new(
                    placed.top - self.scroll,
                    placed.top + placed.height - self.scroll,
                )),
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
