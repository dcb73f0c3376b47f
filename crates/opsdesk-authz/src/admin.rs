//! Role administration.
//!
//! [`RoleManager`] is the only sanctioned way to mutate roles and
//! assignments. Each mutation invalidates the permission cache once the store
//! call completes, whether or not it reports success, and before the call
//! returns:
//!
//! | Mutation | Invalidation |
//! |----------|--------------|
//! | `update_role`, `delete_role` | every user |
//! | `assign_role`, `revoke_role` | the affected user |
//!
//! `create_role` invalidates nothing; a new role has no holders yet.

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthzResult;
use crate::cache::PermissionCache;
use crate::clock::Clock;
use crate::error::AuthzError;
use crate::hierarchy;
use crate::storage::RoleAdminStore;
use crate::types::{Role, UserId, UserRoleAssignment};

/// Mutates roles and assignments while keeping the permission cache coherent.
pub struct RoleManager {
    store: Arc<dyn RoleAdminStore>,
    cache: Arc<PermissionCache>,
    clock: Arc<dyn Clock>,
}

impl RoleManager {
    /// Creates a manager that invalidates `cache`.
    ///
    /// Pass the same cache the [`Authorizer`](crate::Authorizer) uses.
    #[must_use]
    pub fn new(
        store: Arc<dyn RoleAdminStore>,
        cache: Arc<PermissionCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            cache,
            clock,
        }
    }

    /// Lists every role, most privileged first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn list_roles(&self) -> AuthzResult<Vec<Role>> {
        let mut roles = self.store.list_roles().await?;
        hierarchy::sort_by_hierarchy(&mut roles);
        Ok(roles)
    }

    /// Creates a role.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The name is empty or the hierarchy level is 0
    /// - A role with the same name exists
    /// - The store fails
    pub async fn create_role(&self, mut role: Role) -> AuthzResult<Role> {
        validate_role(&role)?;
        if self.store.find_role_by_name(&role.name).await?.is_some() {
            return Err(AuthzError::conflict(format!(
                "role '{}' already exists",
                role.name
            )));
        }

        let now = self.clock.now();
        role.created_at = now;
        role.updated_at = now;
        self.store.create_role(&role).await?;

        tracing::info!(role = %role.name, level = role.hierarchy_level, "Role created");
        Ok(role)
    }

    /// Replaces a role definition and flushes every cached context.
    ///
    /// The system flag and creation time are kept from the stored role.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The role is invalid or doesn't exist
    /// - A system role would be renamed
    /// - The store fails
    pub async fn update_role(&self, mut role: Role) -> AuthzResult<Role> {
        validate_role(&role)?;
        let existing = self
            .store
            .find_role(role.id)
            .await?
            .ok_or_else(|| AuthzError::not_found(format!("role {}", role.id)))?;

        if existing.is_system_role && existing.name != role.name {
            return Err(AuthzError::forbidden(format!(
                "system role '{}' cannot be renamed",
                existing.name
            )));
        }
        if existing.name != role.name
            && self.store.find_role_by_name(&role.name).await?.is_some()
        {
            return Err(AuthzError::conflict(format!(
                "role '{}' already exists",
                role.name
            )));
        }

        role.is_system_role = existing.is_system_role;
        role.created_at = existing.created_at;
        role.updated_at = self.clock.now();
        // The store may have applied the write before failing.
        let updated = self.store.update_role(&role).await;
        self.cache.invalidate_all().await;
        updated?;

        tracing::info!(role = %role.name, "Role updated");
        Ok(role)
    }

    /// Deletes a non-system role and flushes every cached context.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The role doesn't exist
    /// - The role is a system role
    /// - The store fails
    pub async fn delete_role(&self, role_id: Uuid) -> AuthzResult<()> {
        let role = self
            .store
            .find_role(role_id)
            .await?
            .ok_or_else(|| AuthzError::not_found(format!("role {role_id}")))?;

        if role.is_system_role {
            return Err(AuthzError::forbidden(format!(
                "system role '{}' cannot be deleted",
                role.name
            )));
        }

        let deleted = self.store.delete_role(role_id).await;
        self.cache.invalidate_all().await;
        deleted?;

        tracing::info!(role = %role.name, "Role deleted");
        Ok(())
    }

    /// Assigns the named role to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The role doesn't exist or is inactive
    /// - `expires_at` is not in the future
    /// - The store fails
    pub async fn assign_role(
        &self,
        user_id: UserId,
        role_name: &str,
        assigned_by: UserId,
        expires_at: Option<OffsetDateTime>,
    ) -> AuthzResult<UserRoleAssignment> {
        let role = self.role_named(role_name).await?;
        if !role.is_active {
            return Err(AuthzError::forbidden(format!(
                "role '{role_name}' is inactive"
            )));
        }

        let now = self.clock.now();
        let mut assignment = UserRoleAssignment::new(user_id, role.id, assigned_by, now);
        if let Some(expires_at) = expires_at {
            if expires_at <= now {
                return Err(AuthzError::invalid_input("expires_at must be in the future"));
            }
            assignment = assignment.expiring_at(expires_at);
        }

        let assigned = self.store.assign_role(&assignment).await;
        self.cache.invalidate(user_id).await;
        assigned?;

        tracing::info!(
            user_id = %user_id,
            role = %role.name,
            assigned_by = %assigned_by,
            "Role assigned"
        );
        Ok(assignment)
    }

    /// Revokes every active assignment of the named role from `user_id`.
    ///
    /// Returns the number of assignments revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the role doesn't exist or the store fails.
    pub async fn revoke_role(&self, user_id: UserId, role_name: &str) -> AuthzResult<usize> {
        let role = self.role_named(role_name).await?;
        let revoked = self
            .store
            .revoke_role(user_id, role.id, self.clock.now())
            .await;
        self.cache.invalidate(user_id).await;
        let revoked = revoked?;

        tracing::info!(user_id = %user_id, role = %role.name, revoked, "Role revoked");
        Ok(revoked)
    }

    /// Returns the active roles `user_id` currently holds, most privileged
    /// first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn user_roles(&self, user_id: UserId) -> AuthzResult<Vec<Role>> {
        let now = self.clock.now();
        let mut roles = Vec::new();
        for assignment in self.store.list_assignments(user_id).await? {
            if !assignment.is_effective(now) {
                continue;
            }
            if let Some(role) = self.store.find_role(assignment.role_id).await? {
                if role.is_active && !roles.iter().any(|r: &Role| r.id == role.id) {
                    roles.push(role);
                }
            }
        }
        hierarchy::sort_by_hierarchy(&mut roles);
        Ok(roles)
    }

    async fn role_named(&self, name: &str) -> AuthzResult<Role> {
        self.store
            .find_role_by_name(name)
            .await?
            .ok_or_else(|| AuthzError::not_found(format!("role '{name}'")))
    }
}

fn validate_role(role: &Role) -> AuthzResult<()> {
    if role.name.trim().is_empty() {
        return Err(AuthzError::invalid_input("role name cannot be empty"));
    }
    if role.hierarchy_level == 0 {
        return Err(AuthzError::invalid_input("hierarchy_level must be >= 1"));
    }
    Ok(())
}

impl std::fmt::Debug for RoleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleManager")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
