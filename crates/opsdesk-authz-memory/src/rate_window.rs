//! Sliding-window request accounting.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use opsdesk_authz::{ActionId, ResourceId, UserId};
use time::{Duration, OffsetDateTime};

/// Which check charged a window.
///
/// The standalone rate check and the rate check inside `authorize_operation`
/// count separately, so a caller running both for one request is charged
/// once in each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateTier {
    /// `check_rate_limit`.
    FastPath,
    /// `authorize_operation` with `rate_limit_check` set.
    Authoritative,
}

/// Identity of a rate window: (tier, user, action, resource, IP).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub tier: RateTier,
    pub user_id: UserId,
    pub action: ActionId,
    pub resource: ResourceId,
    pub ip_address: Option<IpAddr>,
}

/// Admissions between two sweeps of drained keys.
const SWEEP_INTERVAL: u64 = 1024;

#[derive(Debug, Default)]
struct RateWindow {
    span: Duration,
    admitted: VecDeque<OffsetDateTime>,
}

impl RateWindow {
    fn prune(&mut self, now: OffsetDateTime) {
        let window_start = now - self.span;
        while self.admitted.front().is_some_and(|at| *at <= window_start) {
            self.admitted.pop_front();
        }
    }
}

/// Per-key log of admitted request timestamps.
///
/// A request is admitted when fewer than `max_requests` admitted requests
/// fall inside `(now - window, now]`. Rejected requests are not recorded, so
/// a caller hammering a closed window does not extend it. Keys whose log has
/// drained are dropped by [`SlidingWindowLimiter::sweep`], which also runs
/// every `SWEEP_INTERVAL` admissions.
#[derive(Debug, Default)]
pub struct SlidingWindowLimiter {
    windows: DashMap<RateKey, RateWindow>,
    admissions: AtomicU64,
}

impl SlidingWindowLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the request at `now` and returns `true` if it fits the budget.
    pub fn admit(
        &self,
        key: RateKey,
        max_requests: u32,
        window_minutes: u32,
        now: OffsetDateTime,
    ) -> bool {
        if self.admissions.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            self.sweep(now);
        }

        let mut window = self.windows.entry(key.clone()).or_default();
        window.span = Duration::minutes(i64::from(window_minutes));
        window.prune(now);

        if window.admitted.len() >= max_requests as usize {
            let drained = window.admitted.is_empty();
            drop(window);
            if drained {
                self.windows.remove_if(&key, |_, w| w.admitted.is_empty());
            }
            return false;
        }
        window.admitted.push_back(now);
        true
    }

    /// Prunes every window to its own span and drops keys left empty.
    pub fn sweep(&self, now: OffsetDateTime) {
        self.windows.retain(|_, window| {
            window.prune(now);
            !window.admitted.is_empty()
        });
    }

    /// Number of keys currently holding a window.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Requests currently counted against `key`.
    #[must_use]
    pub fn in_window(&self, key: &RateKey) -> usize {
        self.windows.get(key).map_or(0, |w| w.admitted.len())
    }

    /// Forgets every window.
    pub fn clear(&self) {
        self.windows.clear();
    }
}
