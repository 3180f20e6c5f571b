//! Window grid
//!
//! Windows have a fixed duration and are laid end to end from an anchor
//! instant: window `n` (n ≥ 1) covers `[anchor + (n-1)·w, anchor + n·w)` and
//! is keyed by its end instant. Anchors are normally aligned to the epoch so
//! bars close on round boundaries (a 30s grid closes at :00 and :30).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use types::ids::WindowKey;

/// Fixed-width window layout anchored at an instant (Unix nanoseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGrid {
    anchor: i64,
    window: i64,
}

impl WindowGrid {
    /// Grid with an explicit anchor. `window` must be non-zero.
    pub fn new(anchor_nanos: i64, window: Duration) -> Self {
        let window = i64::try_from(window.as_nanos()).unwrap_or(i64::MAX).max(1);
        Self {
            anchor: anchor_nanos,
            window,
        }
    }

    /// Grid anchored at the last window boundary at or before `now_nanos`.
    pub fn aligned(now_nanos: i64, window: Duration) -> Self {
        let grid = Self::new(0, window);
        Self {
            anchor: grid.align_to_boundary(now_nanos),
            window: grid.window,
        }
    }

    /// Grid aligned to the current wall clock.
    pub fn aligned_to_now(window: Duration) -> Self {
        Self::aligned(unix_now_nanos(), window)
    }

    /// Floor a timestamp to a multiple of the window duration.
    pub fn align_to_boundary(&self, timestamp_nanos: i64) -> i64 {
        timestamp_nanos.div_euclid(self.window) * self.window
    }

    pub fn anchor_nanos(&self) -> i64 {
        self.anchor
    }

    pub fn window_nanos(&self) -> i64 {
        self.window
    }

    /// End instant of the first window after the anchor.
    pub fn first_key(&self) -> WindowKey {
        WindowKey::from_nanos(self.anchor.saturating_add(self.window))
    }

    pub fn next_key(&self, key: WindowKey) -> WindowKey {
        WindowKey::from_nanos(key.as_nanos().saturating_add(self.window))
    }

    /// Start of the window closing at `key`; trades at or after it are live.
    pub fn cutoff(&self, key: WindowKey) -> i64 {
        key.as_nanos().saturating_sub(self.window)
    }

    /// Key of the window containing `timestamp_nanos`.
    pub fn key_for(&self, timestamp_nanos: i64) -> WindowKey {
        let offset = timestamp_nanos.saturating_sub(self.anchor);
        let index = offset.div_euclid(self.window).saturating_add(1);
        WindowKey::from_nanos(
            self.anchor
                .saturating_add(index.saturating_mul(self.window)),
        )
    }
}

/// Current wall-clock time in Unix nanoseconds.
pub fn unix_now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
