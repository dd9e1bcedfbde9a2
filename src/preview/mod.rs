//! Preview and sync scrolling module for ferrite-sync
//!
//! This module keeps the raw editor and the rendered markdown preview
//! aligned while either one is scrolled. Anchors collected from the rendered
//! preview are turned into one monotonic lookup table per scroll direction,
//! and a frame-driven scheduler moves the passive pane without feedback loops.

mod anchors;
mod builder;
mod clock;
mod collector;
mod mapper;
mod scheduler;
mod surface;

pub use anchors::{
    AnchorTable, DirectionAnchor, Pane, PaneExtents, RawAnchorSample, ScrollExtent,
};
pub use builder::{build, build_direction};
pub use clock::{FrameClock, ManualClock, SystemClock};
pub use collector::collect;
pub use mapper::{map, map_scroll, ratio};
pub use scheduler::{InvalidationCause, SyncPhase, SyncScheduler, SyncState};
pub use surface::{
    AnchorNode, BufferRequery, LineBlock, NodeRect, PreviewSurface, ScrollPane, TextBuffer,
};
