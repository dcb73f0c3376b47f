//! Per-user permission cache.
//!
//! Resolved [`AuthorizationContext`]s are kept for a fixed TTL measured from
//! the moment they were written. Role mutations call
//! [`PermissionCache::invalidate`] (one user) or
//! [`PermissionCache::invalidate_all`] (role definition changed) so the next
//! check re-resolves from the store.
//!
//! # Consistency
//!
//! Loads for one user are serialized by a per-user fill lock, and every load
//! carries a [`FillTicket`] recording the invalidation generation it started
//! in. If any invalidation lands while the load is in flight, the loaded
//! context is still returned to that one caller but is not stored, so a
//! pre-invalidation context never re-enters the cache.
//!
//! Per-user bookkeeping is bounded by live entries: expired entries are
//! evicted on lookup and swept periodically on write, and fill locks are
//! released once no load for that user is pending.
//!
//! # Example
//!
//! ```ignore
//! use opsdesk_authz::cache::PermissionCache;
//! use opsdesk_authz::clock::SystemClock;
//! use std::sync::Arc;
//! use time::Duration;
//!
//! let cache = PermissionCache::new(Duration::minutes(5), Arc::new(SystemClock));
//! let context = cache.get_or_load(user_id, || resolve(user_id)).await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use time::{Duration, OffsetDateTime};
use tokio::sync::{Mutex, RwLock};

use crate::AuthzResult;
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::types::{AuthorizationContext, UserId};

// =============================================================================
// Cache State
// =============================================================================

/// Writes between two sweeps of expired entries.
const SWEEP_INTERVAL: u64 = 256;

struct CacheEntry {
    context: AuthorizationContext,
    expires_at: OffsetDateTime,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<UserId, CacheEntry>,

    /// Bumped by every invalidation, single-user or full.
    generation: u64,
}

/// Proof that a load started before or after a given invalidation.
///
/// Obtained from [`PermissionCache::ticket`] before querying the store and
/// handed back to [`PermissionCache::put_if_current`]. Any invalidation issued
/// in between, for any user, voids the ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket {
    user_id: UserId,
    generation: u64,
}

// =============================================================================
// Permission Cache
// =============================================================================

/// Time-boxed cache of resolved authorization contexts, keyed by user.
pub struct PermissionCache {
    state: RwLock<CacheState>,

    /// Serializes loads per user. An entry lives only while a load for that
    /// user is running or waiting.
    fill_locks: DashMap<UserId, Arc<Mutex<()>>>,

    ttl: Duration,
    clock: Arc<dyn Clock>,

    writes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl PermissionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            fill_locks: DashMap::new(),
            ttl,
            clock,
            writes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Creates an empty cache from configuration.
    #[must_use]
    pub fn from_config(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let ttl = Duration::try_from(config.ttl).unwrap_or(Duration::MAX);
        Self::new(ttl, clock)
    }

    /// Returns the cached context if present and unexpired.
    ///
    /// An expired entry found here is evicted.
    pub async fn get(&self, user_id: UserId) -> Option<AuthorizationContext> {
        let found = self.lookup(user_id).await;
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Stores `context`, replacing any existing entry.
    pub async fn put(&self, user_id: UserId, context: AuthorizationContext) {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        self.insert(&mut state, user_id, context, now);
    }

    /// Captures the current invalidation generation for `user_id`.
    pub async fn ticket(&self, user_id: UserId) -> FillTicket {
        let state = self.state.read().await;
        FillTicket {
            user_id,
            generation: state.generation,
        }
    }

    /// Stores `context` only if no invalidation happened since `ticket` was
    /// issued. Returns whether the context was stored.
    pub async fn put_if_current(&self, ticket: &FillTicket, context: AuthorizationContext) -> bool {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        if state.generation != ticket.generation {
            return false;
        }
        self.insert(&mut state, ticket.user_id, context, now);
        true
    }

    /// Returns the cached context, or runs `load` and caches its result.
    ///
    /// Concurrent calls for the same user wait for the first load instead of
    /// querying the store again. A failed load caches nothing.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `load`.
    pub async fn get_or_load<F, Fut>(&self, user_id: UserId, load: F) -> AuthzResult<AuthorizationContext>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AuthzResult<AuthorizationContext>>,
    {
        if let Some(context) = self.get(user_id).await {
            return Ok(context);
        }

        let lock = self.fill_locks.entry(user_id).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            self.fill(user_id, load).await
        };

        // Nobody else holds or waits on this lock: the map and `lock` are
        // the only two references.
        self.fill_locks
            .remove_if(&user_id, |_, held| Arc::ptr_eq(held, &lock) && Arc::strong_count(held) == 2);

        result
    }

    /// Removes one user's entry. The next `get` for that user is a miss.
    pub async fn invalidate(&self, user_id: UserId) {
        let mut state = self.state.write().await;
        state.entries.remove(&user_id);
        state.generation += 1;
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(user_id = %user_id, "Permission cache entry invalidated");
    }

    /// Removes every entry.
    pub async fn invalidate_all(&self) {
        let mut state = self.state.write().await;
        let flushed = state.entries.len();
        state.entries.clear();
        state.generation += 1;
        self.invalidations.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            flushed,
            generation = state.generation,
            "Permission cache flushed"
        );
    }

    /// Drops every expired entry and returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        Self::sweep(&mut state, now)
    }

    /// Returns the configured TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns cache statistics.
    pub async fn stats(&self) -> PermissionCacheStats {
        let now = self.clock.now();
        let state = self.state.read().await;
        PermissionCacheStats {
            entries: state
                .entries
                .values()
                .filter(|entry| entry.expires_at > now)
                .count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            ttl: self.ttl,
        }
    }

    async fn fill<F, Fut>(&self, user_id: UserId, load: F) -> AuthzResult<AuthorizationContext>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AuthzResult<AuthorizationContext>>,
    {
        // Another caller may have filled the entry while we waited.
        if let Some(context) = self.lookup(user_id).await {
            return Ok(context);
        }

        let ticket = self.ticket(user_id).await;
        let context = load().await?;

        if !self.put_if_current(&ticket, context.clone()).await {
            tracing::debug!(
                user_id = %user_id,
                "Permission cache fill discarded after concurrent invalidation"
            );
        }

        Ok(context)
    }

    /// An unrepresentable expiry makes the entry expire immediately.
    fn insert(
        &self,
        state: &mut CacheState,
        user_id: UserId,
        context: AuthorizationContext,
        now: OffsetDateTime,
    ) {
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            Self::sweep(state, now);
        }
        let expires_at = now.checked_add(self.ttl).unwrap_or(now);
        state.entries.insert(
            user_id,
            CacheEntry {
                context,
                expires_at,
            },
        );
    }

    fn sweep(state: &mut CacheState, now: OffsetDateTime) -> usize {
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before - state.entries.len();
        if removed > 0 {
            tracing::debug!(removed, "Expired permission cache entries purged");
        }
        removed
    }

    async fn lookup(&self, user_id: UserId) -> Option<AuthorizationContext> {
        let now = self.clock.now();
        {
            let state = self.state.read().await;
            match state.entries.get(&user_id) {
                None => return None,
                Some(entry) if entry.expires_at > now => return Some(entry.context.clone()),
                Some(_) => {}
            }
        }

        let mut state = self.state.write().await;
        if state
            .entries
            .get(&user_id)
            .is_some_and(|entry| entry.expires_at <= now)
        {
            state.entries.remove(&user_id);
        }
        None
    }
}

impl std::fmt::Debug for PermissionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Cache Statistics
// =============================================================================

/// Statistics about the permission cache.
#[derive(Debug, Clone)]
pub struct PermissionCacheStats {
    /// Number of unexpired entries.
    pub entries: usize,

    /// Lookups answered from the cache.
    pub hits: u64,

    /// Lookups that had to go to the store.
    pub misses: u64,

    /// Invalidation calls (single-user and full).
    pub invalidations: u64,

    /// Cache TTL.
    pub ttl: Duration,
}

// =============================================================================
// Tests
// =============================================================================
