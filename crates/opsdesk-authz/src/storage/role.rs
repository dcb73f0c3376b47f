//! Role administration storage trait.
//!
//! Mutations go through [`RoleManager`](crate::admin::RoleManager), which
//! invalidates the permission cache after each successful write. Calling
//! these methods directly bypasses that invalidation.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthzResult;
use crate::types::{Role, UserId, UserRoleAssignment};

/// Storage operations for roles and assignments.
#[async_trait]
pub trait RoleAdminStore: Send + Sync {
    /// Lists every role, active or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_roles(&self) -> AuthzResult<Vec<Role>>;

    /// Finds a role by its unique ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_role(&self, role_id: Uuid) -> AuthzResult<Option<Role>>;

    /// Finds a role by its unique name.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_role_by_name(&self, name: &str) -> AuthzResult<Option<Role>>;

    /// Creates a role.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A role with the same name already exists
    /// - The storage operation fails
    async fn create_role(&self, role: &Role) -> AuthzResult<()>;

    /// Replaces an existing role.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The role doesn't exist
    /// - The new name collides with another role
    /// - The storage operation fails
    async fn update_role(&self, role: &Role) -> AuthzResult<()>;

    /// Deletes a role and deactivates its assignments.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The role doesn't exist
    /// - The role is a system role
    /// - The storage operation fails
    async fn delete_role(&self, role_id: Uuid) -> AuthzResult<()>;

    /// Stores a new assignment.
    ///
    /// # Errors
    ///
    /// Returns an error if the referenced role doesn't exist or the storage
    /// operation fails.
    async fn assign_role(&self, assignment: &UserRoleAssignment) -> AuthzResult<()>;

    /// Deactivates every active assignment of `role_id` to `user_id`.
    ///
    /// Returns the number of assignments revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_role(
        &self,
        user_id: UserId,
        role_id: Uuid,
        at: OffsetDateTime,
    ) -> AuthzResult<usize>;

    /// Lists a user's assignments, including inactive ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_assignments(&self, user_id: UserId) -> AuthzResult<Vec<UserRoleAssignment>>;
}
