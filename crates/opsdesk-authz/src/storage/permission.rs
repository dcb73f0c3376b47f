//! Role/permission store contract.
//!
//! The store is the durable home of roles, assignments and rate-limit
//! windows. It also performs the authoritative authorization check
//! ([`RolePermissionStore::authorize_operation`]); everything the engine
//! evaluates locally is a fast path in front of that call.

use std::net::IpAddr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::AuthzResult;
use crate::types::{ActionId, PermissionMap, ResourceId, Role, UserId};

// =============================================================================
// Request Types
// =============================================================================

/// Arguments of the authoritative composite check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCheck {
    /// Protected resource.
    pub resource: ResourceId,
    /// Requested action.
    pub action: ActionId,
    /// Caller.
    pub user_id: UserId,
    /// Whether the store should also enforce its own rate window.
    pub rate_limit_check: bool,
    /// Budget for the store-side rate window.
    pub max_requests: u32,
    /// Length of the store-side rate window.
    pub window_minutes: u32,
}

/// Arguments of a rate-window evaluation.
///
/// Windows are keyed by (user, action, resource, IP).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitCheck {
    /// Caller.
    pub user_id: UserId,
    /// Client IP, if known.
    pub ip_address: Option<IpAddr>,
    /// Requested action.
    pub action: ActionId,
    /// Protected resource.
    pub resource: ResourceId,
    /// Requests admitted per window.
    pub max_requests: u32,
    /// Window length in minutes.
    pub window_minutes: u32,
}

/// A durable access-denied audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDeniedRecord {
    /// Caller, when authenticated.
    pub user_id: Option<UserId>,
    /// Requested action.
    pub action: ActionId,
    /// Protected resource.
    pub resource: ResourceId,
    /// Specific record the caller targeted.
    pub resource_id: Option<String>,
    /// Denial text.
    pub reason: String,
    /// Client IP, if known.
    pub ip_address: Option<IpAddr>,
    /// Client user agent, if known.
    pub user_agent: Option<String>,
}

// =============================================================================
// Store Trait
// =============================================================================

/// Query operations the engine needs from the role/permission store.
#[async_trait]
pub trait RolePermissionStore: Send + Sync {
    /// Returns the name of the user's highest-privilege active role, or
    /// [`DEFAULT_ROLE`](crate::types::DEFAULT_ROLE) when the user has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn get_user_role(&self, user_id: UserId) -> AuthzResult<String>;

    /// Returns every active role held through an effective assignment.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn get_user_roles(&self, user_id: UserId) -> AuthzResult<Vec<Role>>;

    /// Returns the union of permissions across the user's effective roles.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn get_user_permissions(&self, user_id: UserId) -> AuthzResult<PermissionMap>;

    /// Returns `true` if the user's effective roles grant the action.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn check_user_permission(
        &self,
        user_id: UserId,
        resource: &ResourceId,
        action: &ActionId,
    ) -> AuthzResult<bool>;

    /// Authoritative composite check (optional rate window + permission).
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn authorize_operation(&self, check: &OperationCheck) -> AuthzResult<bool>;

    /// Counts the request against its window and returns `true` if it is
    /// within budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn check_rate_limit(&self, check: &RateLimitCheck) -> AuthzResult<bool>;

    /// Durably records an access denial.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn log_access_denied(&self, record: &AccessDeniedRecord) -> AuthzResult<()>;
}
