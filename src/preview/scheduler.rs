//! Per-document sync scheduler
//!
//! Owns the pane handles, both direction tables and the sync state machine for
//! one open document:
//!
//! - **Idle**: nothing in flight.
//! - **Syncing(source)**: the lock is held; one mapped step has been (or is
//!   about to be) written to the passive pane and the lock is released on the
//!   following frame.
//! - **Following(source)**: the gap was larger than the per-frame cap; the
//!   passive pane closes it over several frames and snaps exactly once the
//!   residual drops below the settle threshold.
//!
//! Observation callbacks ([`on_scroll`](SyncScheduler::on_scroll),
//! [`invalidate`](SyncScheduler::invalidate), ...) only record intent. Every
//! pane mutation happens inside [`run_frame`](SyncScheduler::run_frame), which
//! the host calls once per rendered frame while
//! [`needs_frame`](SyncScheduler::needs_frame) is true.
//!
//! # Usage
//!
//! ```ignore
//! let mut sync = SyncScheduler::new(load_config());
//! sync.attach_editor(Box::new(editor.clone()));
//! sync.attach_preview(Box::new(preview.clone()));
//! sync.on_buffer_ready(Box::new(editor.clone()), None);
//!
//! // in the UI loop
//! if editor_scrolled { sync.on_scroll(Pane::Editor); }
//! sync.run_frame();
//! if sync.needs_frame() {
//!     ctx.request_repaint();
//! } else if let Some(delay) = sync.next_deadline() {
//!     ctx.request_repaint_after(delay);
//! }
//! ```
//!
//! [`needs_frame`](SyncScheduler::needs_frame) only covers work for the very
//! next frame. Settle rebuilds are timers; the host must also wake up at
//! [`next_deadline`](SyncScheduler::next_deadline) for them to fire.

use std::fmt;
use std::mem;
use std::time::Duration;

use log::{debug, trace};

use super::anchors::{AnchorTable, Pane, PaneExtents, ScrollExtent};
use super::builder::build_direction;
use super::clock::{FrameClock, SystemClock};
use super::collector::collect;
use super::mapper::map_scroll;
use super::surface::{BufferRequery, PreviewSurface, ScrollPane, TextBuffer};
use crate::config::SyncSettings;
use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Public State Types
// ─────────────────────────────────────────────────────────────────────────────

/// Why the anchor tables were invalidated. Only used for logging; every cause
/// leads to the same coalesced rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationCause {
    /// Buffer content edited
    Edit,
    /// Either viewport resized
    Resize,
    /// An image, diagram or formula finished rendering
    ImageSettled,
    /// The preview tree was re-rendered or mutated
    TreeMutation,
    /// Theme, font or style change
    StyleChange,
    /// Explicit paste
    Paste,
    /// Delayed rebuild from a settle burst
    SettleTimer,
    /// Both panes became attached
    Attach,
    /// A buffer handle was captured
    BufferReady,
}

impl InvalidationCause {
    pub fn label(self) -> &'static str {
        match self {
            InvalidationCause::Edit => "edit",
            InvalidationCause::Resize => "resize",
            InvalidationCause::ImageSettled => "image settled",
            InvalidationCause::TreeMutation => "tree mutation",
            InvalidationCause::StyleChange => "style change",
            InvalidationCause::Paste => "paste",
            InvalidationCause::SettleTimer => "settle timer",
            InvalidationCause::Attach => "attach",
            InvalidationCause::BufferReady => "buffer ready",
        }
    }
}

/// State machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Syncing(Pane),
    Following(Pane),
}

impl SyncPhase {
    /// The pane currently driving the sync, if any.
    pub fn source(self) -> Option<Pane> {
        match self {
            SyncPhase::Idle => None,
            SyncPhase::Syncing(pane) | SyncPhase::Following(pane) => Some(pane),
        }
    }
}

/// Reentrancy lock and direction bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncState {
    pub is_syncing: bool,
    pub last_source: Option<Pane>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame Tasks
// ─────────────────────────────────────────────────────────────────────────────

/// Work deferred to the next frame. `token` is the cancellation generation the
/// task was scheduled under; a task whose token no longer matches is dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FrameTask {
    Step { source: Pane, token: u64 },
    Release { token: u64 },
    JumpPreview { y: f32 },
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Sync scrolling engine for one open document.
pub struct SyncScheduler {
    settings: SyncSettings,
    clock: Box<dyn FrameClock>,

    editor: Option<Box<dyn ScrollPane>>,
    preview: Option<Box<dyn PreviewSurface>>,
    buffer: Option<Box<dyn TextBuffer>>,
    requery: Option<BufferRequery>,

    editor_to_preview: AnchorTable,
    preview_to_editor: AnchorTable,
    extents: PaneExtents,

    phase: SyncPhase,
    last_source: Option<Pane>,
    token: u64,

    frame_queue: Vec<FrameTask>,
    rebuild_pending: bool,
    settle_timers: Vec<Duration>,
    last_char_count: Option<usize>,
}

impl fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("phase", &self.phase)
            .field("last_source", &self.last_source)
            .field("editor_attached", &self.editor.is_some())
            .field("preview_attached", &self.preview.is_some())
            .field("buffer_ready", &self.buffer.is_some())
            .field("editor_to_preview", &self.editor_to_preview.len())
            .field("preview_to_editor", &self.preview_to_editor.len())
            .field("frame_queue", &self.frame_queue)
            .field("rebuild_pending", &self.rebuild_pending)
            .field("settle_timers", &self.settle_timers)
            .finish()
    }
}

impl SyncScheduler {
    /// Create a scheduler driven by the wall clock.
    pub fn new(settings: SyncSettings) -> Self {
        Self::with_clock(settings, Box::new(SystemClock::new()))
    }

    /// Create a scheduler with a custom time source.
    pub fn with_clock(mut settings: SyncSettings, clock: Box<dyn FrameClock>) -> Self {
        settings.sanitize();
        Self {
            settings,
            clock,
            editor: None,
            preview: None,
            buffer: None,
            requery: None,
            editor_to_preview: AnchorTable::empty(),
            preview_to_editor: AnchorTable::empty(),
            extents: PaneExtents::default(),
            phase: SyncPhase::Idle,
            last_source: None,
            token: 0,
            frame_queue: Vec::new(),
            rebuild_pending: false,
            settle_timers: Vec::new(),
            last_char_count: None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn sync_state(&self) -> SyncState {
        SyncState {
            is_syncing: self.phase != SyncPhase::Idle,
            last_source: self.last_source,
        }
    }

    /// The direction table used for scrolls originating on `source`.
    pub fn table(&self, source: Pane) -> &AnchorTable {
        match source {
            Pane::Editor => &self.editor_to_preview,
            Pane::Preview => &self.preview_to_editor,
        }
    }

    /// Extents captured by the last successful rebuild.
    pub fn extents(&self) -> PaneExtents {
        self.extents
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Whether the host should schedule another frame. Pending settle timers
    /// are reported by [`next_deadline`](Self::next_deadline) instead.
    pub fn needs_frame(&self) -> bool {
        self.rebuild_pending || !self.frame_queue.is_empty()
    }

    /// Time until the earliest pending settle rebuild, if any.
    pub fn next_deadline(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.settle_timers
            .iter()
            .min()
            .map(|due| due.saturating_sub(now))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Shell Callbacks
    // ─────────────────────────────────────────────────────────────────────────

    pub fn attach_editor(&mut self, pane: Box<dyn ScrollPane>) {
        self.editor = Some(pane);
        self.on_pane_attached();
    }

    pub fn attach_preview(&mut self, surface: Box<dyn PreviewSurface>) {
        self.preview = Some(surface);
        self.on_pane_attached();
    }

    pub fn detach_editor(&mut self) {
        self.editor = None;
        self.cancel_motion();
    }

    pub fn detach_preview(&mut self) {
        self.preview = None;
        self.cancel_motion();
    }

    /// Capture the text buffer handle and trigger the first rebuild.
    ///
    /// `requery` is called at most once per rebuild when the handle reports
    /// itself stale.
    pub fn on_buffer_ready(&mut self, buffer: Box<dyn TextBuffer>, requery: Option<BufferRequery>) {
        self.last_char_count = Some(buffer.char_count());
        self.buffer = Some(buffer);
        self.requery = requery;
        self.invalidate(InvalidationCause::BufferReady);
    }

    /// A pane reported a scroll event.
    ///
    /// Events from the passive pane while a sync is in flight are the echo of
    /// the scheduler's own write and are ignored. Any other event is genuine
    /// input and restarts the sync from that pane, cancelling a catch-up.
    pub fn on_scroll(&mut self, pane: Pane) {
        if !self.settings.enabled || !self.has_panes() {
            return;
        }
        if let Some(source) = self.phase.source() {
            if source != pane {
                trace!(
                    "Ignoring {} scroll while syncing from {}",
                    pane.label(),
                    source.label()
                );
                return;
            }
        }
        self.begin_sync(pane);
    }

    /// Mark both tables stale. Coalesced into one rebuild on the next frame.
    pub fn invalidate(&mut self, cause: InvalidationCause) {
        if !self.rebuild_pending {
            trace!("Anchor tables invalidated ({})", cause.label());
        }
        self.rebuild_pending = true;
    }

    /// The buffer content changed; large jumps in size also schedule a burst
    /// of delayed rebuilds so late-settling renders are picked up.
    pub fn on_content_changed(&mut self, char_count: usize) {
        let previous = self.last_char_count.replace(char_count);
        self.invalidate(InvalidationCause::Edit);
        if let Some(previous) = previous {
            let delta = previous.abs_diff(char_count);
            if delta > self.settings.large_change_chars {
                debug!("Large content change ({} chars), scheduling settle rebuilds", delta);
                self.schedule_settle_burst();
            }
        }
    }

    /// Explicit paste: always rebuild now and again once rendering settles.
    pub fn on_paste(&mut self) {
        self.invalidate(InvalidationCause::Paste);
        self.schedule_settle_burst();
    }

    /// Table-of-contents navigation: move the preview directly, then let the
    /// ordinary preview→editor sync pull the editor along.
    pub fn scroll_preview_to(&mut self, y: f32) {
        self.cancel_motion();
        self.frame_queue.push(FrameTask::JumpPreview { y });
    }

    /// Set whether sync scrolling is enabled.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.enabled = enabled;
        if !enabled {
            self.cancel_motion();
        }
    }

    /// Toggle sync scrolling on/off.
    pub fn toggle(&mut self) -> bool {
        self.set_enabled(!self.settings.enabled);
        self.settings.enabled
    }

    /// Cancel all pending work and drop every handle.
    pub fn dispose(&mut self) {
        debug!("Disposing sync scheduler");
        self.next_token();
        self.frame_queue.clear();
        self.settle_timers.clear();
        self.rebuild_pending = false;
        self.editor = None;
        self.preview = None;
        self.buffer = None;
        self.requery = None;
        self.editor_to_preview = AnchorTable::empty();
        self.preview_to_editor = AnchorTable::empty();
        self.extents = PaneExtents::default();
        self.phase = SyncPhase::Idle;
        self.last_source = None;
        self.last_char_count = None;
    }

    /// Visible editor range mapped into preview coordinates, for a position
    /// marker in the preview gutter.
    pub fn preview_indicator_range(&self, editor_viewport_height: f32) -> Option<(f32, f32)> {
        let top = self.scroll_top_of(Pane::Editor)?;
        let source = self.extent_of(Pane::Editor)?;
        let target = self.extent_of(Pane::Preview)?;
        let table = &self.editor_to_preview;
        let start = map_scroll(table, top, source, target);
        let end = map_scroll(table, top + editor_viewport_height.max(0.0), source, target);
        Some((start, end.max(start)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Frame Loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one frame: due settle timers, the coalesced rebuild, then the
    /// motion scheduled by the previous frame. Tasks scheduled while running
    /// land in the next frame.
    pub fn run_frame(&mut self) {
        self.fire_due_timers();

        let tasks = mem::take(&mut self.frame_queue);

        if mem::take(&mut self.rebuild_pending) {
            let rebuilt = self.rebuild();
            // A pending step or jump reads the fresh tables itself
            let motion_pending = tasks.iter().any(|task| self.is_live_motion(task));
            if rebuilt && !motion_pending {
                self.resync();
            }
        }

        for task in tasks {
            match task {
                FrameTask::Step { source, token } if token == self.token => {
                    self.step(source, token);
                }
                FrameTask::Release { token } if token == self.token => {
                    trace!("Sync lock released");
                    self.phase = SyncPhase::Idle;
                }
                FrameTask::JumpPreview { y } => self.jump_preview(y),
                FrameTask::Step { .. } | FrameTask::Release { .. } => {
                    trace!("Dropping cancelled frame task {:?}", task);
                }
            }
        }
    }

    fn is_live_motion(&self, task: &FrameTask) -> bool {
        match task {
            FrameTask::Step { token, .. } => *token == self.token,
            FrameTask::JumpPreview { .. } => true,
            FrameTask::Release { .. } => false,
        }
    }

    fn fire_due_timers(&mut self) {
        if self.settle_timers.is_empty() {
            return;
        }
        let now = self.clock.now();
        let before = self.settle_timers.len();
        self.settle_timers.retain(|due| *due > now);
        if self.settle_timers.len() != before {
            self.invalidate(InvalidationCause::SettleTimer);
        }
    }

    fn schedule_settle_burst(&mut self) {
        let now = self.clock.now();
        self.settle_timers
            .extend(self.settings.settle_delays().map(|delay| now + delay));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // State Transitions
    // ─────────────────────────────────────────────────────────────────────────

    fn on_pane_attached(&mut self) {
        if self.has_panes() {
            debug!("Both panes attached, resetting sync state");
            self.next_token();
            self.frame_queue.clear();
            self.phase = SyncPhase::Idle;
            self.last_source = None;
            self.invalidate(InvalidationCause::Attach);
        }
    }

    fn begin_sync(&mut self, source: Pane) {
        if let SyncPhase::Following(_) = self.phase {
            trace!("New {} scroll cancels catch-up", source.label());
        }
        let token = self.next_token();
        self.phase = SyncPhase::Syncing(source);
        self.last_source = Some(source);
        self.frame_queue.push(FrameTask::Step { source, token });
    }

    fn cancel_motion(&mut self) {
        self.next_token();
        self.phase = SyncPhase::Idle;
    }

    fn next_token(&mut self) -> u64 {
        self.token = self.token.wrapping_add(1);
        self.token
    }

    /// One frame of motion on the passive pane.
    fn step(&mut self, source: Pane, token: u64) {
        let Some((target, current)) = self.alignment(source) else {
            self.phase = SyncPhase::Idle;
            return;
        };
        let residual = target - current;
        let cap = self.settings.max_step_px;

        let threshold = self.settings.settle_threshold_px;

        if residual.abs() <= threshold {
            self.settle(source, token, residual, target);
            return;
        }

        match self.phase {
            SyncPhase::Following(_) => {
                let delta = (residual * self.settings.catch_up_ratio).clamp(-cap, cap);
                // Panes that round their offsets would swallow a sub-threshold move
                if delta.abs() < threshold {
                    self.settle(source, token, residual, target);
                    return;
                }
                self.write(source.other(), current + delta);
                self.frame_queue.push(FrameTask::Step { source, token });
            }
            _ if residual.abs() > cap => {
                debug!(
                    "{} → {} gap of {:.0}px exceeds step cap, catching up",
                    source.label(),
                    source.other().label(),
                    residual
                );
                self.write(source.other(), current + cap.copysign(residual));
                self.phase = SyncPhase::Following(source);
                self.frame_queue.push(FrameTask::Step { source, token });
            }
            _ => {
                self.write(source.other(), target);
                self.frame_queue.push(FrameTask::Release { token });
            }
        }
    }

    /// Snap the passive pane onto `target` and release the lock next frame.
    fn settle(&mut self, source: Pane, token: u64, residual: f32, target: f32) {
        if residual != 0.0 {
            self.write(source.other(), target);
        }
        self.frame_queue.push(FrameTask::Release { token });
    }

    /// Single realignment after a rebuild, biased to the last active source.
    fn resync(&mut self) {
        if !self.settings.enabled {
            return;
        }
        let source = self.last_source.unwrap_or(Pane::Editor);
        let Some((target, current)) = self.alignment(source) else {
            return;
        };
        if (target - current).abs() < self.settings.settle_threshold_px {
            return;
        }
        trace!("Resync {} → {}: {:.1}", source.label(), source.other().label(), target);
        self.write(source.other(), target);
        // Hold the lock over the echo of this write
        let token = self.next_token();
        self.phase = SyncPhase::Syncing(source);
        self.frame_queue.push(FrameTask::Release { token });
    }

    fn jump_preview(&mut self, y: f32) {
        let Some(preview) = self.preview.as_mut() else {
            return;
        };
        let y = preview.extent().clamp(y);
        debug!("Jumping preview to {:.0}", y);
        preview.set_scroll_top(y);
        if self.settings.enabled && self.editor.is_some() {
            self.begin_sync(Pane::Preview);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rebuild
    // ─────────────────────────────────────────────────────────────────────────

    fn rebuild(&mut self) -> bool {
        match self.try_rebuild() {
            Ok(()) => true,
            Err(err) => {
                debug!("Skipping anchor rebuild: {}", err);
                false
            }
        }
    }

    fn try_rebuild(&mut self) -> Result<()> {
        self.ensure_buffer()?;

        let editor = self
            .editor
            .as_deref()
            .filter(|pane| pane.is_attached())
            .ok_or(Error::StaleHandle { pane: Pane::Editor })?;
        let preview = self
            .preview
            .as_deref()
            .filter(|pane| pane.is_attached())
            .ok_or(Error::StaleHandle {
                pane: Pane::Preview,
            })?;
        let buffer = self
            .buffer
            .as_deref()
            .ok_or(Error::StaleHandle { pane: Pane::Editor })?;

        let extents = PaneExtents {
            editor: editor.extent(),
            preview: preview.extent(),
        };
        let samples = collect(preview, buffer, extents);

        self.editor_to_preview = build_direction(&samples, Pane::Editor, extents);
        self.preview_to_editor = build_direction(&samples, Pane::Preview, extents);
        self.extents = extents;

        debug!(
            "Rebuilt anchor tables: {} samples, {}/{} entries, extents {:.0}/{:.0}",
            samples.len(),
            self.editor_to_preview.len(),
            self.preview_to_editor.len(),
            extents.editor.max_scrollable,
            extents.preview.max_scrollable
        );
        Ok(())
    }

    /// Make sure the buffer handle is usable, re-querying once if stale.
    fn ensure_buffer(&mut self) -> Result<()> {
        if self.buffer.as_ref().is_some_and(|buffer| !buffer.is_stale()) {
            return Ok(());
        }
        let requery = self
            .requery
            .as_mut()
            .ok_or(Error::StaleHandle { pane: Pane::Editor })?;

        debug!("Buffer handle stale, re-querying the editing surface");
        match requery() {
            Some(fresh) if !fresh.is_stale() => {
                self.buffer = Some(fresh);
                Ok(())
            }
            _ => Err(Error::StaleHandle { pane: Pane::Editor }),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pane Access
    // ─────────────────────────────────────────────────────────────────────────

    fn has_panes(&self) -> bool {
        self.editor.is_some() && self.preview.is_some()
    }

    /// `(target, current)` offsets of the passive pane for a sync from `source`.
    fn alignment(&self, source: Pane) -> Option<(f32, f32)> {
        let source_y = self.scroll_top_of(source)?;
        let source_extent = self.extent_of(source)?;
        let target_extent = self.extent_of(source.other())?;
        let current = self.scroll_top_of(source.other())?;
        let target = map_scroll(self.table(source), source_y, source_extent, target_extent);
        Some((target, current))
    }

    fn scroll_top_of(&self, pane: Pane) -> Option<f32> {
        match pane {
            Pane::Editor => self.editor.as_ref().map(|p| p.scroll_top()),
            Pane::Preview => self.preview.as_ref().map(|p| p.scroll_top()),
        }
    }

    fn extent_of(&self, pane: Pane) -> Option<ScrollExtent> {
        match pane {
            Pane::Editor => self.editor.as_ref().map(|p| p.extent()),
            Pane::Preview => self.preview.as_ref().map(|p| p.extent()),
        }
    }

    fn write(&mut self, pane: Pane, y: f32) {
        match pane {
            Pane::Editor => {
                if let Some(editor) = self.editor.as_mut() {
                    editor.set_scroll_top(y);
                }
            }
            Pane::Preview => {
                if let Some(preview) = self.preview.as_mut() {
                    preview.set_scroll_top(y);
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::{AnchorNode, LineBlock, ManualClock, NodeRect};
    use std::cell::RefCell;
    use std::rc::Rc;

    const LINE_HEIGHT: f32 = 20.0;

    /// Scroll container that records every write.
    #[derive(Default)]
    struct FakePane {
        scroll: f32,
        max: f32,
        detached: bool,
        /// Floor every write, like a DOM `scrollTop`
        whole_pixels: bool,
        writes: Vec<f32>,
        /// `(sequence, line, top)` in document coordinates
        anchors: Vec<(u64, usize, f32)>,
        node_queries: usize,
    }

    impl FakePane {
        fn new(max: f32) -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self {
                max,
                ..Self::default()
            }))
        }
    }

    impl ScrollPane for FakePane {
        fn is_attached(&self) -> bool {
            !self.detached
        }

        fn scroll_top(&self) -> f32 {
            self.scroll
        }

        fn set_scroll_top(&mut self, top: f32) {
            let top = top.clamp(0.0, self.max);
            self.scroll = if self.whole_pixels { top.floor() } else { top };
            self.writes.push(self.scroll);
        }

        fn extent(&self) -> ScrollExtent {
            ScrollExtent::new(self.max)
        }
    }

    impl PreviewSurface for FakePane {
        fn anchor_nodes(&self) -> Vec<AnchorNode> {
            self.anchors
                .iter()
                .map(|&(seq, line, top)| AnchorNode {
                    sequence: Some(seq),
                    start_line: Some(line),
                    end_line: Some(line),
                    rect: Some(NodeRect::new(top - self.scroll, top + 10.0 - self.scroll)),
                    ..AnchorNode::default()
                })
                .collect()
        }
    }

    struct FakeBuffer {
        stale: bool,
    }

    impl TextBuffer for FakeBuffer {
        fn is_stale(&self) -> bool {
            self.stale
        }

        fn line_block(&self, line: usize) -> Option<LineBlock> {
            let top = line.checked_sub(1)? as f32 * LINE_HEIGHT;
            Some(LineBlock::new(top, top + LINE_HEIGHT))
        }

        fn offset_block(&self, _offset: usize) -> Option<LineBlock> {
            None
        }

        fn char_count(&self) -> usize {
            1000
        }
    }

    /// Counts rebuilds by wrapping the preview's anchor enumeration.
    struct CountingPreview(Rc<RefCell<FakePane>>);

    impl ScrollPane for CountingPreview {
        fn scroll_top(&self) -> f32 {
            self.0.scroll_top()
        }

        fn set_scroll_top(&mut self, top: f32) {
            self.0.set_scroll_top(top);
        }

        fn extent(&self) -> ScrollExtent {
            self.0.extent()
        }

        fn is_attached(&self) -> bool {
            self.0.is_attached()
        }
    }

    impl PreviewSurface for CountingPreview {
        fn anchor_nodes(&self) -> Vec<AnchorNode> {
            self.0.borrow_mut().node_queries += 1;
            self.0.anchor_nodes()
        }
    }

    struct Harness {
        sync: SyncScheduler,
        clock: ManualClock,
        editor: Rc<RefCell<FakePane>>,
        preview: Rc<RefCell<FakePane>>,
    }

    impl Harness {
        /// Editor scrolls 0..1000, preview 0..2000, no anchors: a 1:2 mapping.
        fn new() -> Self {
            Self::with_settings(SyncSettings::default())
        }

        fn with_settings(settings: SyncSettings) -> Self {
            let clock = ManualClock::new();
            let mut sync = SyncScheduler::with_clock(settings, Box::new(clock.clone()));
            let editor = FakePane::new(1000.0);
            let preview = FakePane::new(2000.0);
            sync.attach_editor(Box::new(editor.clone()));
            sync.attach_preview(Box::new(CountingPreview(preview.clone())));
            sync.on_buffer_ready(Box::new(FakeBuffer { stale: false }), None);
            sync.run_frame();
            Self {
                sync,
                clock,
                editor,
                preview,
            }
        }

        fn user_scroll(&mut self, pane: Pane, y: f32) {
            match pane {
                Pane::Editor => self.editor.borrow_mut().set_scroll_top(y),
                Pane::Preview => self.preview.borrow_mut().set_scroll_top(y),
            }
            self.sync.on_scroll(pane);
        }

        /// Run frames until nothing is pending; returns the frame count.
        fn settle(&mut self) -> usize {
            let mut frames = 0;
            while self.sync.needs_frame() {
                self.sync.run_frame();
                frames += 1;
                assert!(frames < 200, "scheduler never settled");
            }
            frames
        }

        fn node_queries(&self) -> usize {
            self.preview.borrow().node_queries
        }
    }

    #[test]
    fn test_attach_builds_tables() {
        let h = Harness::new();
        assert_eq!(h.node_queries(), 1);
        assert_eq!(h.sync.table(Pane::Editor).len(), 2);
        assert_eq!(h.sync.table(Pane::Preview).len(), 2);
        assert_eq!(h.sync.phase(), SyncPhase::Idle);
        assert_eq!(h.sync.sync_state(), SyncState::default());
        assert!(h.editor.borrow().writes.is_empty());
        assert!(h.preview.borrow().writes.is_empty());
    }

    #[test]
    fn test_mutations_deferred_to_frame() {
        let mut h = Harness::new();
        h.user_scroll(Pane::Editor, 100.0);
        assert_eq!(h.sync.phase(), SyncPhase::Syncing(Pane::Editor));
        assert!(h.preview.borrow().writes.is_empty());

        h.sync.run_frame();
        assert_eq!(h.preview.borrow().writes, vec![200.0]);
    }

    #[test]
    fn test_echo_scroll_is_suppressed() {
        let mut h = Harness::new();
        h.user_scroll(Pane::Preview, 300.0);
        assert_eq!(h.preview.borrow().writes.len(), 1);

        h.sync.run_frame();
        assert_eq!(h.editor.borrow().scroll, 150.0);

        // The editor reports the scheduler's own write back
        h.sync.on_scroll(Pane::Editor);
        assert_eq!(h.sync.phase(), SyncPhase::Syncing(Pane::Preview));

        h.settle();
        assert_eq!(h.sync.phase(), SyncPhase::Idle);
        assert_eq!(h.preview.borrow().writes.len(), 1);
        assert_eq!(h.editor.borrow().writes.len(), 1);
        assert_eq!(h.sync.sync_state().last_source, Some(Pane::Preview));
    }

    #[test]
    fn test_late_echo_does_not_oscillate() {
        let mut h = Harness::new();
        h.user_scroll(Pane::Preview, 300.0);
        h.settle();

        // Echo delivered after the lock was released
        h.sync.on_scroll(Pane::Editor);
        h.settle();
        assert_eq!(h.preview.borrow().writes, vec![300.0]);
        assert_eq!(h.editor.borrow().writes, vec![150.0]);
    }

    #[test]
    fn test_lock_released_next_frame() {
        let mut h = Harness::new();
        h.user_scroll(Pane::Editor, 50.0);
        h.sync.run_frame();
        assert!(h.sync.sync_state().is_syncing);
        h.sync.run_frame();
        assert!(!h.sync.sync_state().is_syncing);
        assert!(!h.sync.needs_frame());
    }

    #[test]
    fn test_large_step_split_across_frames() {
        let mut h = Harness::new();
        h.user_scroll(Pane::Editor, 600.0);

        h.sync.run_frame();
        assert_eq!(h.sync.phase(), SyncPhase::Following(Pane::Editor));
        assert_eq!(h.preview.borrow().scroll, 240.0);

        let frames = h.settle();
        assert!(frames >= 2);
        assert_eq!(h.sync.phase(), SyncPhase::Idle);

        let writes = h.preview.borrow().writes.clone();
        assert!(writes.len() >= 3, "{:?}", writes);
        assert_eq!(*writes.last().unwrap(), 1200.0);
        let mut previous = 0.0;
        for w in &writes {
            assert!(*w - previous <= 240.0 + 1e-3, "step too large in {:?}", writes);
            assert!(*w >= previous);
            previous = *w;
        }
        // The final snap closes the last few pixels in one write
        let before_snap = writes[writes.len() - 2];
        assert!(1200.0 - before_snap <= 2.0);
    }

    #[test]
    fn test_catch_up_settles_on_whole_pixel_pane() {
        let mut h = Harness::new();
        h.preview.borrow_mut().whole_pixels = true;
        h.user_scroll(Pane::Editor, 600.0);

        h.settle();
        assert_eq!(h.sync.phase(), SyncPhase::Idle);
        assert_eq!(h.preview.borrow().scroll, 1200.0);

        let writes = h.preview.borrow().writes.clone();
        assert!(writes.len() < 20, "{:?}", writes);
        assert!(writes.windows(2).all(|w| w[1] > w[0]), "stalled in {:?}", writes);
    }

    #[test]
    fn test_residual_at_threshold_snaps() {
        let mut h = Harness::new();
        h.preview.borrow_mut().set_scroll_top(199.0);
        h.user_scroll(Pane::Editor, 100.0);
        h.sync.run_frame();
        assert_eq!(h.preview.borrow().scroll, 200.0);
        h.sync.run_frame();
        assert_eq!(h.sync.phase(), SyncPhase::Idle);
    }

    #[test]
    fn test_new_scroll_cancels_catch_up() {
        let mut h = Harness::new();
        h.user_scroll(Pane::Editor, 600.0);
        h.sync.run_frame();
        h.sync.run_frame();
        assert_eq!(h.sync.phase(), SyncPhase::Following(Pane::Editor));

        h.user_scroll(Pane::Editor, 100.0);
        assert_eq!(h.sync.phase(), SyncPhase::Syncing(Pane::Editor));
        h.settle();
        assert_eq!(h.preview.borrow().scroll, 200.0);
        assert_eq!(h.sync.phase(), SyncPhase::Idle);
    }

    #[test]
    fn test_passive_scroll_ignored_while_following() {
        let mut h = Harness::new();
        h.user_scroll(Pane::Editor, 600.0);
        h.sync.run_frame();

        h.sync.on_scroll(Pane::Preview);
        assert_eq!(h.sync.phase(), SyncPhase::Following(Pane::Editor));
        h.settle();
        assert_eq!(h.editor.borrow().writes, vec![600.0]);
        assert_eq!(h.preview.borrow().scroll, 1200.0);
    }

    #[test]
    fn test_rebuilds_coalesce_per_frame() {
        let mut h = Harness::new();
        h.sync.invalidate(InvalidationCause::Resize);
        h.sync.invalidate(InvalidationCause::ImageSettled);
        h.sync.invalidate(InvalidationCause::TreeMutation);
        h.sync.invalidate(InvalidationCause::StyleChange);
        h.sync.run_frame();
        assert_eq!(h.node_queries(), 2);
        assert!(!h.sync.needs_frame());
    }

    #[test]
    fn test_rebuild_resyncs_from_last_source() {
        let mut h = Harness::new();
        h.user_scroll(Pane::Preview, 300.0);
        h.settle();
        assert_eq!(h.editor.borrow().scroll, 150.0);

        // A heading on line 11 (editor 200) renders at preview 1000
        h.preview.borrow_mut().anchors = vec![(0, 11, 1000.0)];
        h.sync.invalidate(InvalidationCause::TreeMutation);
        h.sync.run_frame();

        assert_eq!(h.node_queries(), 2);
        assert!((h.editor.borrow().scroll - 60.0).abs() < 1e-3);
        assert_eq!(h.preview.borrow().writes, vec![300.0]);
        assert_eq!(h.sync.sync_state().last_source, Some(Pane::Preview));
        assert_eq!(h.sync.phase(), SyncPhase::Syncing(Pane::Preview));

        // The editor echo of the resync write is suppressed
        h.sync.on_scroll(Pane::Editor);
        h.settle();
        assert_eq!(h.preview.borrow().writes, vec![300.0]);
    }

    #[test]
    fn test_rebuild_mid_sync_feeds_pending_step() {
        let mut h = Harness::new();
        h.user_scroll(Pane::Editor, 200.0);
        h.preview.borrow_mut().anchors = vec![(0, 11, 100.0)];
        h.sync.invalidate(InvalidationCause::Edit);
        h.sync.run_frame();

        // One write only, already using the rebuilt table (ratio would give 400)
        assert_eq!(h.preview.borrow().writes, vec![100.0]);
    }

    #[test]
    fn test_anchor_table_drives_mapping() {
        let mut h = Harness::new();
        h.preview.borrow_mut().anchors = vec![(0, 21, 150.0)];
        h.sync.invalidate(InvalidationCause::TreeMutation);
        h.sync.run_frame();

        let table = h.sync.table(Pane::Editor);
        assert!(table.iter().any(|a| a.source_y == 400.0 && a.target_y == 150.0));

        h.user_scroll(Pane::Editor, 400.0);
        h.settle();
        assert_eq!(h.preview.borrow().scroll, 150.0);
    }

    #[test]
    fn test_large_content_change_schedules_settle_burst() {
        let mut h = Harness::new();
        h.sync.on_content_changed(1000 + 5000);
        assert_eq!(h.sync.next_deadline(), Some(Duration::from_millis(80)));
        h.sync.run_frame();
        assert_eq!(h.node_queries(), 2);

        h.clock.advance(Duration::from_millis(80));
        assert!(h.sync.next_deadline().is_some());
        h.sync.run_frame();
        assert_eq!(h.node_queries(), 3);

        h.clock.advance(Duration::from_millis(500));
        h.sync.run_frame();
        // The 240ms and 520ms timers coalesce into one rebuild
        assert_eq!(h.node_queries(), 4);
        assert_eq!(h.sync.next_deadline(), None);
    }

    #[test]
    fn test_small_content_change_rebuilds_once() {
        let mut h = Harness::new();
        h.sync.on_content_changed(1010);
        assert_eq!(h.sync.next_deadline(), None);
        h.sync.run_frame();
        assert_eq!(h.node_queries(), 2);
    }

    #[test]
    fn test_paste_always_bursts() {
        let mut h = Harness::new();
        h.sync.on_paste();
        assert!(h.sync.needs_frame());
        assert_eq!(h.sync.next_deadline(), Some(Duration::from_millis(80)));
    }

    #[test]
    fn test_stale_buffer_requeried_once() {
        let mut h = Harness::new();
        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        h.sync.on_buffer_ready(
            Box::new(FakeBuffer { stale: true }),
            Some(Box::new(move || {
                *counter.borrow_mut() += 1;
                Some(Box::new(FakeBuffer { stale: false }) as Box<dyn TextBuffer>)
            })),
        );
        h.sync.run_frame();
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(h.node_queries(), 2);

        // The fresh handle is kept
        h.sync.invalidate(InvalidationCause::Edit);
        h.sync.run_frame();
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(h.node_queries(), 3);
    }

    #[test]
    fn test_unrecoverable_stale_buffer_degrades_to_ratio() {
        let clock = ManualClock::new();
        let mut sync = SyncScheduler::with_clock(SyncSettings::default(), Box::new(clock));
        let editor = FakePane::new(1000.0);
        let preview = FakePane::new(500.0);
        sync.attach_editor(Box::new(editor.clone()));
        sync.attach_preview(Box::new(preview.clone()));
        sync.on_buffer_ready(
            Box::new(FakeBuffer { stale: true }),
            Some(Box::new(|| -> Option<Box<dyn TextBuffer>> { None })),
        );
        sync.run_frame();
        assert!(sync.table(Pane::Editor).is_empty());

        editor.borrow_mut().set_scroll_top(400.0);
        sync.on_scroll(Pane::Editor);
        sync.run_frame();
        assert_eq!(preview.borrow().scroll, 200.0);
    }

    #[test]
    fn test_detached_preview_skips_rebuild() {
        let mut h = Harness::new();
        h.preview.borrow_mut().detached = true;
        h.sync.invalidate(InvalidationCause::Resize);
        h.sync.run_frame();
        assert_eq!(h.node_queries(), 1);
        assert_eq!(h.sync.table(Pane::Editor).len(), 2);
    }

    #[test]
    fn test_scroll_preview_to_pulls_editor() {
        let mut h = Harness::new();
        h.sync.scroll_preview_to(1000.0);
        assert!(h.preview.borrow().writes.is_empty());

        h.sync.run_frame();
        assert_eq!(h.preview.borrow().scroll, 1000.0);
        assert_eq!(h.sync.phase(), SyncPhase::Syncing(Pane::Preview));

        h.settle();
        assert_eq!(h.editor.borrow().scroll, 500.0);
        assert_eq!(h.preview.borrow().writes, vec![1000.0]);
    }

    #[test]
    fn test_scroll_preview_to_clamps() {
        let mut h = Harness::new();
        h.sync.scroll_preview_to(9000.0);
        h.settle();
        assert_eq!(h.preview.borrow().scroll, 2000.0);
        assert_eq!(h.editor.borrow().scroll, 1000.0);
    }

    #[test]
    fn test_disabled_ignores_scroll() {
        let mut h = Harness::new();
        assert!(!h.sync.toggle());
        h.user_scroll(Pane::Editor, 300.0);
        assert!(!h.sync.needs_frame());
        assert!(h.preview.borrow().writes.is_empty());

        assert!(h.sync.toggle());
        h.user_scroll(Pane::Editor, 300.0);
        h.settle();
        assert_eq!(h.preview.borrow().scroll, 600.0);
    }

    #[test]
    fn test_disabling_cancels_catch_up() {
        let mut h = Harness::new();
        h.user_scroll(Pane::Editor, 600.0);
        h.sync.run_frame();
        h.sync.set_enabled(false);
        assert_eq!(h.sync.phase(), SyncPhase::Idle);
        h.settle();
        assert_eq!(h.preview.borrow().writes, vec![240.0]);
    }

    #[test]
    fn test_reattach_resets_state() {
        let mut h = Harness::new();
        h.user_scroll(Pane::Editor, 600.0);
        h.sync.run_frame();
        assert!(h.sync.sync_state().is_syncing);

        h.sync.detach_preview();
        assert_eq!(h.sync.phase(), SyncPhase::Idle);
        h.user_scroll(Pane::Editor, 700.0);
        assert!(!h.sync.sync_state().is_syncing);

        h.sync.attach_preview(Box::new(CountingPreview(h.preview.clone())));
        assert_eq!(h.sync.sync_state(), SyncState::default());
        assert!(h.sync.needs_frame());
    }

    #[test]
    fn test_dispose_cancels_everything() {
        let mut h = Harness::new();
        h.user_scroll(Pane::Editor, 600.0);
        h.sync.on_paste();
        h.sync.dispose();

        assert!(!h.sync.needs_frame());
        assert_eq!(h.sync.next_deadline(), None);
        h.clock.advance(Duration::from_secs(1));
        h.sync.run_frame();
        assert!(h.preview.borrow().writes.is_empty());
        assert!(h.sync.table(Pane::Editor).is_empty());
        assert_eq!(h.sync.sync_state(), SyncState::default());

        // Entry points stay total after disposal
        h.sync.on_scroll(Pane::Editor);
        h.sync.scroll_preview_to(10.0);
        h.sync.run_frame();
    }

    #[test]
    fn test_preview_indicator_range() {
        let mut h = Harness::new();
        h.user_scroll(Pane::Editor, 100.0);
        let (start, end) = h.sync.preview_indicator_range(300.0).unwrap();
        assert_eq!(start, 200.0);
        assert_eq!(end, 800.0);
    }
}
