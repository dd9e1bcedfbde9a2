//! Sync scrolling settings
//!
//! This module defines the `SyncSettings` struct that holds the tunable
//! constants of the sync engine, with serde support for JSON persistence.
//! The per-frame step cap and the settle threshold depend on how fast the
//! host renders, so they are configuration rather than constants.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// User-configurable sync scrolling options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    // ─────────────────────────────────────────────────────────────────────────
    // Behavior
    // ─────────────────────────────────────────────────────────────────────────
    /// Whether synchronized scrolling between editor and preview is enabled
    pub enabled: bool,

    /// Largest distance the passive pane moves in a single frame (pixels)
    pub max_step_px: f32,

    /// Residual error below which the passive pane snaps exactly (pixels)
    pub settle_threshold_px: f32,

    /// Fraction of the remaining gap closed per frame while catching up
    pub catch_up_ratio: f32,

    // ─────────────────────────────────────────────────────────────────────────
    // Settle Rebuilds
    // ─────────────────────────────────────────────────────────────────────────
    /// Character-count delta above which a content change schedules
    /// delayed rebuilds
    pub large_change_chars: usize,

    /// Delays (milliseconds after the change) of the delayed rebuild burst
    pub settle_delays_ms: Vec<u64>,

    // ─────────────────────────────────────────────────────────────────────────
    // Headless Layout
    // ─────────────────────────────────────────────────────────────────────────
    /// Editor line height used by the headless layout (pixels)
    pub editor_line_height: f32,

    /// Editor viewport height used by the headless layout (pixels)
    pub editor_viewport_height: f32,

    /// Preview viewport height used by the headless layout (pixels)
    pub preview_viewport_height: f32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_step_px: 240.0,
            settle_threshold_px: 1.0,
            catch_up_ratio: 0.5,

            large_change_chars: 400,
            settle_delays_ms: vec![80, 240, 520],

            editor_line_height: 20.0,
            editor_viewport_height: 600.0,
            preview_viewport_height: 600.0,
        }
    }
}

impl SyncSettings {
    // ─────────────────────────────────────────────────────────────────────────
    // Validation Constants and Sanitization
    // ─────────────────────────────────────────────────────────────────────────

    /// Minimum allowed per-frame step.
    pub const MIN_STEP_PX: f32 = 8.0;
    /// Maximum allowed per-frame step.
    pub const MAX_STEP_PX: f32 = 10_000.0;
    /// Minimum settle threshold.
    pub const MIN_SETTLE_PX: f32 = 0.1;
    /// Maximum settle threshold.
    pub const MAX_SETTLE_PX: f32 = 32.0;
    /// Minimum catch-up ratio.
    pub const MIN_CATCH_UP_RATIO: f32 = 0.1;
    /// Largest accepted settle delay.
    pub const MAX_SETTLE_DELAY_MS: u64 = 5_000;
    /// Most delayed rebuilds kept per burst.
    pub const MAX_SETTLE_DELAYS: usize = 8;
    /// Minimum line height.
    pub const MIN_LINE_HEIGHT: f32 = 4.0;
    /// Maximum line height.
    pub const MAX_LINE_HEIGHT: f32 = 200.0;
    /// Minimum viewport height.
    pub const MIN_VIEWPORT: f32 = 50.0;
    /// Maximum viewport height.
    pub const MAX_VIEWPORT: f32 = 10_000.0;

    /// Sanitize settings by clamping values to valid ranges.
    ///
    /// This is useful after loading settings from a file that might have
    /// been manually edited with invalid values.
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        self.max_step_px = clamp_or(
            self.max_step_px,
            Self::MIN_STEP_PX,
            Self::MAX_STEP_PX,
            defaults.max_step_px,
        );
        self.settle_threshold_px = clamp_or(
            self.settle_threshold_px,
            Self::MIN_SETTLE_PX,
            Self::MAX_SETTLE_PX,
            defaults.settle_threshold_px,
        );

        self.catch_up_ratio = clamp_or(
            self.catch_up_ratio,
            Self::MIN_CATCH_UP_RATIO,
            1.0,
            defaults.catch_up_ratio,
        );

        // The threshold must stay below the step or catch-up could never land
        if self.settle_threshold_px >= self.max_step_px {
            self.settle_threshold_px = self.max_step_px / 2.0;
        }

        // Keep delays sorted, unique and bounded
        self.settle_delays_ms.retain(|d| *d > 0);
        for delay in &mut self.settle_delays_ms {
            *delay = (*delay).min(Self::MAX_SETTLE_DELAY_MS);
        }
        self.settle_delays_ms.sort_unstable();
        self.settle_delays_ms.dedup();
        self.settle_delays_ms.truncate(Self::MAX_SETTLE_DELAYS);

        self.editor_line_height = clamp_or(
            self.editor_line_height,
            Self::MIN_LINE_HEIGHT,
            Self::MAX_LINE_HEIGHT,
            defaults.editor_line_height,
        );
        self.editor_viewport_height = clamp_or(
            self.editor_viewport_height,
            Self::MIN_VIEWPORT,
            Self::MAX_VIEWPORT,
            defaults.editor_viewport_height,
        );
        self.preview_viewport_height = clamp_or(
            self.preview_viewport_height,
            Self::MIN_VIEWPORT,
            Self::MAX_VIEWPORT,
            defaults.preview_viewport_height,
        );
    }

    /// Parse settings from JSON and sanitize them.
    pub fn from_json_sanitized(json: &str) -> Result<Self, serde_json::Error> {
        let mut settings: Self = serde_json::from_str(json)?;
        settings.sanitize();
        Ok(settings)
    }

    /// The delayed rebuild burst as durations.
    pub fn settle_delays(&self) -> impl Iterator<Item = Duration> + '_ {
        self.settle_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
    }
}

fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
