//! ferrite-sync - bidirectional scroll synchronization between a markdown
//! source buffer and its rendered preview.
//!
//! The engine lives in [`preview`]: anchors are collected from the rendered
//! preview, turned into one monotonic table per scroll direction, and a
//! frame-driven scheduler keeps the passive pane aligned without feedback
//! loops. [`markdown`] and [`layout`] provide a comrak-based anchor source and
//! a headless geometry model so the engine can run without a UI toolkit.

pub mod config;
pub mod error;
pub mod layout;
pub mod markdown;
pub mod preview;
