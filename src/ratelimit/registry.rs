//! Named policies and their limiters.
//!
//! A [`PolicySet`] is built once per process from configuration and shared
//! by every request. Each name owns an independent [`RateLimiter`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::clock::{Clock, SystemClock};
use super::limiter::RateLimiter;
use super::policy::Policy;
use super::sweeper::SweepHandle;
use crate::config::RateLimitingConfig;
use crate::error::Result;
use crate::http::RateLimitLayer;

/// The process-wide collection of named rate limiters.
#[derive(Clone, Default)]
pub struct PolicySet {
    limiters: BTreeMap<String, Arc<RateLimiter>>,
}

impl PolicySet {
    /// Create an empty policy set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a limiter for every configured policy, using the system clock.
    pub fn from_config(config: &RateLimitingConfig) -> Result<Self> {
        Self::from_config_with_clock(config, Arc::new(SystemClock))
    }

    /// Build a limiter for every configured policy, sharing one clock.
    pub fn from_config_with_clock(
        config: &RateLimitingConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let mut set = Self::new();
        for (name, policy) in &config.policies {
            policy.validate()?;
            info!(
                policy = %name,
                window_ms = policy.window_ms,
                max_requests = policy.max_requests,
                "Registering rate limit policy"
            );
            set.insert(name, Arc::new(RateLimiter::with_clock(*policy, clock.clone())));
        }
        Ok(set)
    }

    /// Add or replace the limiter registered under `name`.
    pub fn insert(&mut self, name: &str, limiter: Arc<RateLimiter>) {
        self.limiters.insert(name.to_string(), limiter);
    }

    /// Get the limiter registered under `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<RateLimiter>> {
        self.limiters.get(name)
    }

    /// Get a middleware layer enforcing the policy registered under `name`.
    pub fn layer(&self, name: &str) -> Option<RateLimitLayer> {
        self.get(name).cloned().map(RateLimitLayer::new)
    }

    /// Iterate over every registered name and its policy, in name order.
    pub fn policies(&self) -> impl Iterator<Item = (&str, Policy)> {
        self.limiters
            .iter()
            .map(|(name, limiter)| (name.as_str(), limiter.policy()))
    }

    /// Get the registered policy names, in order.
    pub fn names(&self) -> Vec<&str> {
        self.limiters.keys().map(String::as_str).collect()
    }

    /// Get the number of registered policies.
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// Whether no policy is registered.
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    /// Start one sweeper per limiter.
    pub fn spawn_sweepers(&self, interval: Duration) -> Vec<SweepHandle> {
        self.limiters
            .values()
            .map(|limiter| limiter.spawn_sweeper(interval))
            .collect()
    }
}
