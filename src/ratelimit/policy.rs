//! Rate limit policies.
//!
//! A policy is the (window duration, quota) pair behind one named use-case.
//! Every policy gets its own [`RateLimiter`](super::RateLimiter), so quota
//! exhaustion under one name never leaks into another.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{Result, SketchguardError};

/// Policy guarding login, signup and PIN entry.
pub const AUTH: &str = "auth";
/// Policy guarding artwork uploads.
pub const UPLOAD: &str = "upload";
/// Policy guarding everything without a more specific rule.
pub const GENERAL: &str = "general";
/// Policy guarding likes on artwork.
pub const LIKE: &str = "like";

/// Longest accepted window: five years of 365 days, in milliseconds.
pub const MAX_WINDOW_MS: u64 = 5 * 365 * 24 * 60 * 60 * 1000;

/// A fixed-window rate limit rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Length of the window in milliseconds
    pub window_ms: u64,
    /// Number of requests admitted per window
    pub max_requests: u32,
}

impl Policy {
    /// Create a policy, rejecting a zero or oversized window and a zero quota.
    pub fn new(window: Duration, max_requests: u32) -> Result<Self> {
        let window_ms = u64::try_from(window.as_millis()).map_err(|_| {
            SketchguardError::Config(format!(
                "policy window must not exceed {} ms",
                MAX_WINDOW_MS
            ))
        })?;
        let policy = Self {
            window_ms,
            max_requests,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Check that the quota is positive and the window is in `1..=MAX_WINDOW_MS`.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(SketchguardError::Config(
                "policy window_ms must be positive".to_string(),
            ));
        }
        if self.window_ms > MAX_WINDOW_MS {
            return Err(SketchguardError::Config(format!(
                "policy window_ms must not exceed {}",
                MAX_WINDOW_MS
            )));
        }
        if self.max_requests == 0 {
            return Err(SketchguardError::Config(
                "policy max_requests must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the window length.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Get the window length as a chrono duration, for timestamp arithmetic.
    ///
    /// Clamped to `MAX_WINDOW_MS` so an unvalidated policy can never wrap
    /// into a negative delta.
    pub(crate) fn window_delta(&self) -> chrono::TimeDelta {
        let millis = self.window_ms.min(MAX_WINDOW_MS) as i64;
        chrono::TimeDelta::try_milliseconds(millis).unwrap_or(chrono::TimeDelta::MAX)
    }
}

/// The built-in policies, keyed by name.
pub fn default_policies() -> BTreeMap<String, Policy> {
    let mut policies = BTreeMap::new();
    policies.insert(
        AUTH.to_string(),
        Policy {
            window_ms: 15 * 60 * 1000,
            max_requests: 5,
        },
    );
    policies.insert(
        UPLOAD.to_string(),
        Policy {
            window_ms: 60 * 60 * 1000,
            max_requests: 10,
        },
    );
    policies.insert(
        GENERAL.to_string(),
        Policy {
            window_ms: 60 * 1000,
            max_requests: 100,
        },
    );
    policies.insert(
        LIKE.to_string(),
        Policy {
            window_ms: 60 * 1000,
            max_requests: 30,
        },
    );
    policies
}
