//! Request budgets per operation class.
//!
//! Counting happens in the store ([`RolePermissionStore::check_rate_limit`]);
//! this module picks the budget and decides whether to ask at all.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::AuthzResult;
use crate::config::RateLimitsConfig;
use crate::storage::{RateLimitCheck, RolePermissionStore};
use crate::types::{ActionId, ResourceId, UserId};

/// Window shared by every built-in profile.
pub const DEFAULT_WINDOW_MINUTES: u32 = 60;

/// A request budget: `max_requests` per `window_minutes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Requests admitted per window.
    pub max_requests: u32,

    /// Window length in minutes.
    pub window_minutes: u32,

    /// When false the check is skipped entirely.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl RateLimit {
    /// An enabled budget.
    #[must_use]
    pub const fn new(max_requests: u32, window_minutes: u32) -> Self {
        Self {
            max_requests,
            window_minutes,
            enabled: true,
        }
    }

    /// The same budget with checking turned off.
    #[must_use]
    pub const fn disabled(self) -> Self {
        Self {
            enabled: false,
            ..self
        }
    }
}

/// Operation classes with their own budget.
///
/// Call sites pick the profile; nothing classifies operations automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitProfile {
    /// Ordinary reads and writes: 100/h.
    General,
    /// Role changes, exports, credential edits: 20/h.
    Sensitive,
    /// Bulk imports, mass sends, batch deletes: 10/h.
    BulkOperations,
    /// File uploads: 50/h.
    FileUpload,
    /// Programmatic API access: 1000/h.
    ApiCalls,
}

impl RateLimitProfile {
    /// Every profile, in declaration order.
    pub const ALL: [RateLimitProfile; 5] = [
        Self::General,
        Self::Sensitive,
        Self::BulkOperations,
        Self::FileUpload,
        Self::ApiCalls,
    ];

    /// Returns the built-in budget for this profile.
    #[must_use]
    pub const fn default_limit(self) -> RateLimit {
        let max_requests = match self {
            Self::General => 100,
            Self::Sensitive => 20,
            Self::BulkOperations => 10,
            Self::FileUpload => 50,
            Self::ApiCalls => 1000,
        };
        RateLimit::new(max_requests, DEFAULT_WINDOW_MINUTES)
    }

    /// Returns the configuration key of this profile.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Sensitive => "sensitive",
            Self::BulkOperations => "bulk_operations",
            Self::FileUpload => "file_upload",
            Self::ApiCalls => "api_calls",
        }
    }
}

impl fmt::Display for RateLimitProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Rate Limiter
// =============================================================================

/// Evaluates request budgets against the store's rate windows.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RolePermissionStore>,
    profiles: RateLimitsConfig,
}

impl RateLimiter {
    /// Creates a limiter using `profiles` as the budget table.
    #[must_use]
    pub fn new(store: Arc<dyn RolePermissionStore>, profiles: RateLimitsConfig) -> Self {
        Self { store, profiles }
    }

    /// Returns the configured budget for `profile`.
    #[must_use]
    pub fn profile(&self, profile: RateLimitProfile) -> RateLimit {
        self.profiles.limit_for(profile)
    }

    /// Returns `true` if the request fits in `limit`.
    ///
    /// A disabled limit admits the request without contacting the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot evaluate the window.
    pub async fn check(
        &self,
        user_id: UserId,
        ip_address: Option<IpAddr>,
        action: &ActionId,
        resource: &ResourceId,
        limit: RateLimit,
    ) -> AuthzResult<bool> {
        if !limit.enabled {
            return Ok(true);
        }

        let check = RateLimitCheck {
            user_id,
            ip_address,
            action: action.clone(),
            resource: resource.clone(),
            max_requests: limit.max_requests,
            window_minutes: limit.window_minutes,
        };

        let within_budget = self.store.check_rate_limit(&check).await?;
        if !within_budget {
            tracing::debug!(
                user_id = %user_id,
                resource = %resource,
                action = %action,
                max_requests = limit.max_requests,
                window_minutes = limit.window_minutes,
                "Rate limit exceeded"
            );
        }
        Ok(within_budget)
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("profiles", &self.profiles)
            .finish()
    }
}
