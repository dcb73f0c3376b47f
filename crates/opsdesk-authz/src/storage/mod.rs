//! Storage traits for authorization data.
//!
//! This module defines the contracts the engine consumes:
//!
//! - [`RolePermissionStore`]: permission queries, rate windows and the
//!   authoritative check
//! - [`RoleAdminStore`]: role and assignment persistence
//!
//! # Implementations
//!
//! - `opsdesk-authz-memory` - in-memory reference backend

pub mod permission;
pub mod role;

pub use permission::{AccessDeniedRecord, OperationCheck, RateLimitCheck, RolePermissionStore};
pub use role::RoleAdminStore;
