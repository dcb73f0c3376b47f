//! # opsdesk-authz
//!
//! Authorization and permission resolution engine for the OpsDesk console.
//!
//! This crate provides:
//! - A decision pipeline that authorizes every sensitive console operation
//! - A per-user permission cache with TTL and invalidation
//! - Role hierarchy resolution and admin bypass
//! - Request budgets per operation class
//! - Audit events for every decision
//! - Role administration that keeps the cache coherent
//!
//! ## Overview
//!
//! Roles, assignments and rate windows live in an external store reached
//! through [`RolePermissionStore`] and [`RoleAdminStore`]. The engine keeps a
//! local fast path (cached context, admin bypass, rate budget) in front of the
//! store's authoritative check, and fails closed whenever anything goes wrong.
//!
//! ## Modules
//!
//! - [`engine`] - The [`Authorizer`] decision pipeline
//! - [`cache`] - Per-user context cache
//! - [`hierarchy`] - Role ordering and admin membership
//! - [`rate_limit`] - Rate-limit profiles and limiter
//! - [`audit`] - Audit events, sinks and emitter
//! - [`admin`] - Role and assignment mutations
//! - [`config`] - Engine configuration and loader
//! - [`storage`] - Store contracts
//! - [`session`] - Caller identity contract
//! - [`types`] - Roles, assignments, permissions and decisions

pub mod admin;
pub mod audit;
pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod rate_limit;
pub mod session;
pub mod storage;
pub mod types;

pub use admin::RoleManager;
pub use audit::{
    AuditEmitter, AuditEvent, AuditEventBuilder, AuditEventType, AuditSeverity, AuditSink,
    StoreAuditSink,
};
pub use cache::{FillTicket, PermissionCache, PermissionCacheStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthzConfig, ConfigError};
pub use engine::{AuthorizeOptions, Authorizer, AuthorizerBuilder};
pub use error::{AuthzError, DenialReason, ErrorCategory};
pub use rate_limit::{RateLimit, RateLimitProfile, RateLimiter};
pub use session::{SessionProvider, StaticSession};
pub use storage::{
    AccessDeniedRecord, OperationCheck, RateLimitCheck, RoleAdminStore, RolePermissionStore,
};
pub use types::{
    ActionId, AuthorizationContext, AuthorizationDecision, DecisionMethod, PermissionMap,
    ResourceId, Role, RoleBuilder, Session, UserId, UserRoleAssignment,
};

/// Type alias for authorization results.
pub type AuthzResult<T> = Result<T, AuthzError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use opsdesk_authz::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthzResult;
    pub use crate::admin::RoleManager;
    pub use crate::audit::{AuditEvent, AuditSink};
    pub use crate::config::AuthzConfig;
    pub use crate::engine::{AuthorizeOptions, Authorizer};
    pub use crate::error::{AuthzError, DenialReason};
    pub use crate::rate_limit::{RateLimit, RateLimitProfile};
    pub use crate::session::{SessionProvider, StaticSession};
    pub use crate::storage::{RoleAdminStore, RolePermissionStore};
    pub use crate::types::{
        ActionId, AuthorizationContext, AuthorizationDecision, PermissionMap, ResourceId, Role,
        Session, UserId,
    };
}
