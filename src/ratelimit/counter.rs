//! Per-identifier counter state.

use chrono::{DateTime, TimeDelta, Utc};

/// Requests seen for one identifier in its current window.
///
/// The count keeps growing past the limit; rejected requests are counted too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterEntry {
    /// Number of checks attributed to this identifier in the current window
    pub count: u64,
    /// When the current window ends and fresh quota begins
    pub window_reset_at: DateTime<Utc>,
}

impl CounterEntry {
    /// Open a new window at `now` holding a single request.
    ///
    /// A reset time past chrono's range saturates at `DateTime::<Utc>::MAX_UTC`.
    pub fn open(now: DateTime<Utc>, window: TimeDelta) -> Self {
        Self {
            count: 1,
            window_reset_at: now
                .checked_add_signed(window)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Whether the window has elapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.window_reset_at <= now
    }

    /// Record one more request in the current window.
    pub fn increment(&mut self) -> u64 {
        self.count = self.count.saturating_add(1);
        self.count
    }

    /// Quota left under `limit`, floored at zero.
    pub fn remaining(&self, limit: u32) -> u32 {
        (limit as u64).saturating_sub(self.count) as u32
    }
}
