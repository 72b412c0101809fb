//! Retry timing for the subscription lifecycle
//!
//! Two kinds of delay are produced here:
//!
//! 1. **Resolution retries** - a failed route lookup is retried after a
//!    uniform-random delay in `[resolution_retry_min, resolution_retry_max)`
//!    (1.0s to 2.0s by default). The wait does not grow.
//! 2. **Backoff retries** - when a dialog terminates and no route is left, or
//!    the attempt window has expired, the current wait doubles (capped at
//!    `max_wait`) and the delay is drawn uniformly from `[wait, 2 * wait)`.
//!
//! A successful `active` or `pending` transition resets everything.
//!
//! ```rust
//! use sipim_presence_core::backoff::{BackoffPolicy, RetryContext};
//! use sipim_presence_core::config::RetrySettings;
//! use tokio::time::Instant;
//!
//! let settings = RetrySettings::default();
//! let mut policy = BackoffPolicy::with_seed(settings.clone(), 7);
//! let mut ctx = RetryContext::new(&settings, Instant::now());
//!
//! let delay = policy.next_backoff(&mut ctx);
//! assert_eq!(ctx.current_wait(), 1.0);
//! assert!(delay.as_secs_f64() >= 1.0 && delay.as_secs_f64() < 2.0);
//! ```

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

use crate::config::RetrySettings;
use crate::route::RouteSet;

/// Mutable retry state owned by one subscription session
#[derive(Debug)]
pub struct RetryContext {
    current_wait: f64,
    deadline: Instant,
    pending_routes: RouteSet,
}

impl RetryContext {
    pub fn new(settings: &RetrySettings, now: Instant) -> Self {
        Self {
            current_wait: settings.initial_wait,
            deadline: now,
            pending_routes: RouteSet::new(),
        }
    }

    /// Current backoff base in seconds
    pub fn current_wait(&self) -> f64 {
        self.current_wait
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn pending_routes(&self) -> &RouteSet {
        &self.pending_routes
    }

    pub fn pending_routes_mut(&mut self) -> &mut RouteSet {
        &mut self.pending_routes
    }

    pub fn replace_routes(&mut self, routes: RouteSet) {
        self.pending_routes = routes;
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.deadline
    }

    /// Whether the next attempt has to wait for a full backoff.
    ///
    /// Route exhaustion and window expiry are deliberately combined: either one
    /// alone forces a backoff.
    pub fn should_back_off(&self, now: Instant) -> bool {
        self.pending_routes.is_empty() || self.is_expired(now)
    }
}

/// Randomized retry delay calculator
#[derive(Debug)]
pub struct BackoffPolicy {
    settings: RetrySettings,
    rng: StdRng,
}

impl BackoffPolicy {
    pub fn new(settings: RetrySettings) -> Self {
        Self {
            settings,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic policy, mostly useful in tests
    pub fn with_seed(settings: RetrySettings, seed: u64) -> Self {
        Self {
            settings,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    /// Delay before retrying a failed route lookup
    pub fn resolution_retry_delay(&mut self) -> Duration {
        let secs = self.uniform(
            self.settings.resolution_retry_min,
            self.settings.resolution_retry_max,
        );
        Duration::from_secs_f64(secs)
    }

    /// Grow the wait and draw the delay before the next resolution cycle
    pub fn next_backoff(&mut self, ctx: &mut RetryContext) -> Duration {
        ctx.current_wait = (ctx.current_wait * 2.0).min(self.settings.max_wait);
        let wait = ctx.current_wait;
        Duration::from_secs_f64(self.uniform(wait, 2.0 * wait))
    }

    /// Start a new attempt window ending `attempt_window` from now
    pub fn open_window(&self, ctx: &mut RetryContext, now: Instant) {
        ctx.deadline = now + self.settings.attempt_window();
    }

    /// Back to `{initial_wait, now, no routes}` after a successful transition
    pub fn reset(&self, ctx: &mut RetryContext, now: Instant) {
        ctx.current_wait = self.settings.initial_wait;
        ctx.deadline = now;
        ctx.pending_routes.clear();
    }

    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{Route, TransportProtocol};
    use std::net::{IpAddr, Ipv4Addr};

    fn settings() -> RetrySettings {
        RetrySettings::default()
    }

    #[test]
    fn test_resolution_delay_stays_in_range() {
        let mut policy = BackoffPolicy::with_seed(settings(), 42);
        for _ in 0..1000 {
            let d = policy.resolution_retry_delay().as_secs_f64();
            assert!((1.0..2.0).contains(&d), "delay {} out of range", d);
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut policy = BackoffPolicy::with_seed(settings(), 1);
        let mut ctx = RetryContext::new(&settings(), Instant::now());

        let mut expected = 0.5;
        for _ in 0..10 {
            let delay = policy.next_backoff(&mut ctx).as_secs_f64();
            expected = f64::min(expected * 2.0, 30.0);
            assert_eq!(ctx.current_wait(), expected);
            assert!(delay >= expected && delay < 2.0 * expected);
        }
        assert_eq!(ctx.current_wait(), 30.0);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let policy = BackoffPolicy::with_seed(settings(), 3);
        let now = Instant::now();
        let mut ctx = RetryContext::new(&settings(), now);
        ctx.current_wait = 16.0;
        ctx.replace_routes(RouteSet::from(vec![Route::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            5060,
            TransportProtocol::Udp,
        )]));

        policy.reset(&mut ctx, now);
        assert_eq!(ctx.current_wait(), 0.5);
        assert_eq!(ctx.deadline(), now);
        assert!(ctx.pending_routes().is_empty());
    }

    #[test]
    fn test_back_off_when_routes_exhausted_or_window_expired() {
        let policy = BackoffPolicy::with_seed(settings(), 3);
        let now = Instant::now();
        let mut ctx = RetryContext::new(&settings(), now);
        policy.open_window(&mut ctx, now);

        // No routes, window open
        assert!(ctx.should_back_off(now));

        ctx.replace_routes(RouteSet::from(vec![Route::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            5060,
            TransportProtocol::Tcp,
        )]));
        assert!(!ctx.should_back_off(now + Duration::from_secs(5)));
        assert!(ctx.should_back_off(now + Duration::from_secs(31)));
    }
}
