//! Core rate limiter implementation.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::trace;

use super::clock::{Clock, SystemClock};
use super::counter::CounterEntry;
use super::policy::Policy;

/// The outcome of one rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Whether the request is admitted
    pub allowed: bool,
    /// The policy quota
    pub limit: u32,
    /// Quota left in the current window, never negative
    pub remaining: u32,
    /// When a fresh window, and fresh quota, begins for this identifier
    pub reset_time: DateTime<Utc>,
}

impl Decision {
    /// Whole seconds until the window resets, rounded up and floored at zero.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_time - now).num_milliseconds();
        if millis <= 0 {
            0
        } else {
            (millis as u64).div_ceil(1000)
        }
    }
}

/// A fixed-window rate limiter for a single policy.
///
/// Each identifier gets a counter that opens on its first request and resets
/// in full on the first request after `window_reset_at`. This struct is
/// thread-safe and meant to be shared behind an `Arc`.
pub struct RateLimiter {
    /// The rule applied to every identifier
    policy: Policy,
    /// Counter entries indexed by client identifier
    entries: DashMap<String, CounterEntry>,
    /// Source of `now` for window arithmetic
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter driven by the system clock.
    pub fn new(policy: Policy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    /// Create a rate limiter driven by the given clock.
    pub fn with_clock(policy: Policy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            entries: DashMap::new(),
            clock,
        }
    }

    /// Count a request from `identifier` and decide whether to admit it.
    ///
    /// The read, decide and write all happen while the entry's shard is
    /// write-locked, so concurrent checks on one identifier are serialized.
    pub fn check(&self, identifier: &str) -> Decision {
        let now = self.clock.now();
        let limit = self.policy.max_requests;
        let window = self.policy.window_delta();

        let entry = match self.entries.entry(identifier.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(now) {
                    *entry = CounterEntry::open(now, window);
                } else {
                    entry.increment();
                }
                *entry
            }
            Entry::Vacant(vacant) => {
                let entry = CounterEntry::open(now, window);
                trace!(identifier = %identifier, "Opening rate limit window");
                vacant.insert(entry);
                entry
            }
        };

        let allowed = entry.count <= limit as u64;

        Decision {
            allowed,
            limit,
            remaining: entry.remaining(limit),
            reset_time: entry.window_reset_at,
        }
    }

    /// Delete every entry whose window has elapsed.
    ///
    /// Returns the number of entries removed. Only one shard is locked at a
    /// time, so checks on other shards proceed while this runs.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Get the policy this limiter enforces.
    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Get the current time according to this limiter's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Get the current count for an identifier, if it has an entry.
    pub fn count_for(&self, identifier: &str) -> Option<u64> {
        self.entries.get(identifier).map(|entry| entry.count)
    }

    /// Get the number of tracked identifiers.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use chrono::TimeDelta;
    use std::time::Duration;

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    fn limiter_with_clock(window_ms: u64, max_requests: u32) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let policy = Policy::new(Duration::from_millis(window_ms), max_requests).unwrap();
        (RateLimiter::with_clock(policy, clock.clone()), clock)
    }

    #[test]
    fn test_first_check_is_allowed() {
        let (limiter, _clock) = limiter_with_clock(60_000, 5);

        let decision = limiter.check("10.0.0.1:42");

        assert!(decision.allowed);
        assert_eq!(decision.limit, 5);
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.reset_time, start() + TimeDelta::seconds(60));
        assert_eq!(limiter.entry_count(), 1);
    }

    #[test]
    fn test_quota_counts_down_to_zero() {
        let (limiter, _clock) = limiter_with_clock(60_000, 4);

        let remaining: Vec<u32> = (0..4)
            .map(|_| {
                let decision = limiter.check("client");
                assert!(decision.allowed);
                decision.remaining
            })
            .collect();

        assert_eq!(remaining, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_over_quota_is_rejected_and_still_counted() {
        let (limiter, _clock) = limiter_with_clock(60_000, 2);

        limiter.check("client");
        limiter.check("client");
        let third = limiter.check("client");
        let fourth = limiter.check("client");

        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
        assert!(!fourth.allowed);
        assert_eq!(limiter.count_for("client"), Some(4));
    }

    #[test]
    fn test_window_does_not_slide_within_window() {
        let (limiter, clock) = limiter_with_clock(60_000, 3);

        let first = limiter.check("client");
        clock.advance(TimeDelta::seconds(30));
        let second = limiter.check("client");

        assert_eq!(first.reset_time, second.reset_time);
    }

    #[test]
    fn test_concrete_scenario() {
        let (limiter, clock) = limiter_with_clock(60_000, 3);
        let id = "1.2.3.4:555";

        let mut allowed = Vec::new();
        let mut remaining = Vec::new();
        for t in [0, 1000, 2000, 3000] {
            clock.set(start() + TimeDelta::milliseconds(t));
            let decision = limiter.check(id);
            allowed.push(decision.allowed);
            remaining.push(decision.remaining);
        }

        assert_eq!(allowed, vec![true, true, true, false]);
        assert_eq!(remaining, vec![2, 1, 0, 0]);

        clock.set(start() + TimeDelta::milliseconds(61_000));
        let decision = limiter.check(id);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(
            decision.reset_time,
            start() + TimeDelta::milliseconds(121_000)
        );
    }

    #[test]
    fn test_full_reset_after_heavy_overuse() {
        let (limiter, clock) = limiter_with_clock(1_000, 2);

        for _ in 0..50 {
            limiter.check("greedy");
        }
        assert!(!limiter.check("greedy").allowed);

        clock.advance(TimeDelta::seconds(1));
        let decision = limiter.check("greedy");

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
        assert_eq!(limiter.count_for("greedy"), Some(1));
    }

    #[test]
    fn test_identifiers_are_isolated() {
        let (limiter, _clock) = limiter_with_clock(60_000, 1);

        assert!(limiter.check("a").allowed);
        assert!(!limiter.check("a").allowed);

        let decision = limiter.check("b");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(limiter.count_for("a"), Some(2));
        assert_eq!(limiter.count_for("b"), Some(1));
    }

    #[test]
    fn test_sweep_removes_only_expired_entries() {
        let (limiter, clock) = limiter_with_clock(10_000, 3);

        limiter.check("old");
        clock.advance(TimeDelta::seconds(5));
        limiter.check("fresh");
        clock.advance(TimeDelta::seconds(5));

        assert_eq!(limiter.sweep_expired(), 1);
        assert_eq!(limiter.count_for("old"), None);
        assert_eq!(limiter.count_for("fresh"), Some(1));
    }

    #[test]
    fn test_sweep_does_not_change_decisions() {
        let (swept, swept_clock) = limiter_with_clock(1_000, 2);
        let (unswept, unswept_clock) = limiter_with_clock(1_000, 2);

        let timeline = [0, 100, 200, 300, 1_100, 1_200, 2_500, 2_600, 2_700];
        for t in timeline {
            swept_clock.set(start() + TimeDelta::milliseconds(t));
            unswept_clock.set(start() + TimeDelta::milliseconds(t));

            swept.sweep_expired();
            assert_eq!(swept.check("id"), unswept.check("id"));
        }
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let decision = Decision {
            allowed: false,
            limit: 1,
            remaining: 0,
            reset_time: start() + TimeDelta::milliseconds(1_500),
        };

        assert_eq!(decision.retry_after_secs(start()), 2);
        assert_eq!(
            decision.retry_after_secs(start() + TimeDelta::milliseconds(500)),
            1
        );
        assert_eq!(
            decision.retry_after_secs(start() + TimeDelta::seconds(10)),
            0
        );
    }

    #[test]
    fn test_concurrent_checks_never_over_admit() {
        let policy = Policy::new(Duration::from_secs(3600), 50).unwrap();
        let limiter = Arc::new(RateLimiter::new(policy));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..25).filter(|_| limiter.check("shared").allowed).count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
        assert_eq!(limiter.count_for("shared"), Some(200));
    }

    #[test]
    fn test_oversized_window_still_enforces_quota() {
        let clock = Arc::new(ManualClock::new(start()));
        let policy = Policy {
            window_ms: u64::MAX,
            max_requests: 1,
        };
        let limiter = RateLimiter::with_clock(policy, clock.clone());

        let first = limiter.check("id");
        let second = limiter.check("id");
        let third = limiter.check("id");

        assert!(first.allowed);
        assert!(!second.allowed);
        assert!(!third.allowed);
        assert!(third.reset_time > clock.now());
    }

    #[test]
    fn test_clear_entries() {
        let (limiter, _clock) = limiter_with_clock(60_000, 3);

        limiter.check("a");
        limiter.check("b");
        assert_eq!(limiter.entry_count(), 2);

        limiter.clear();
        assert_eq!(limiter.entry_count(), 0);
    }
}
