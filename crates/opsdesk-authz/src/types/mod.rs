//! Core authorization data types.

pub mod assignment;
pub mod context;
pub mod permission;
pub mod role;

pub use assignment::{UserId, UserRoleAssignment};
pub use context::{AuthorizationContext, AuthorizationDecision, DecisionMethod, Session};
pub use permission::{ActionId, PermissionMap, ResourceId};
pub use role::{ADMIN_ROLE, DEFAULT_ROLE, Role, RoleBuilder, SUPER_ADMIN_ROLE, default_roles};
