//! In-memory role/permission store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use opsdesk_authz::clock::{Clock, SystemClock};
use opsdesk_authz::hierarchy::highest_role;
use opsdesk_authz::types::{DEFAULT_ROLE, default_roles};
use opsdesk_authz::{
    AccessDeniedRecord, ActionId, AuthzError, AuthzResult, OperationCheck, PermissionMap,
    RateLimitCheck, ResourceId, Role, RoleAdminStore, RolePermissionStore, UserId,
    UserRoleAssignment,
};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::rate_window::{RateKey, RateTier, SlidingWindowLimiter};

#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) roles: HashMap<Uuid, Role>,
    /// Unique name index.
    pub(crate) names: HashMap<String, Uuid>,
    pub(crate) assignments: Vec<UserRoleAssignment>,
}

impl StoreState {
    pub(crate) fn insert_role(&mut self, role: Role) -> AuthzResult<()> {
        if self.roles.contains_key(&role.id) {
            return Err(AuthzError::conflict(format!("role id {} already exists", role.id)));
        }
        if self.names.contains_key(&role.name) {
            return Err(AuthzError::conflict(format!(
                "role '{}' already exists",
                role.name
            )));
        }
        self.names.insert(role.name.clone(), role.id);
        self.roles.insert(role.id, role);
        Ok(())
    }

    pub(crate) fn role_by_name(&self, name: &str) -> Option<&Role> {
        self.names.get(name).and_then(|id| self.roles.get(id))
    }

    /// Active roles reachable through effective assignments, deduplicated.
    fn effective_roles(&self, user_id: UserId, now: OffsetDateTime) -> Vec<Role> {
        let mut roles: Vec<Role> = Vec::new();
        for assignment in &self.assignments {
            if assignment.user_id != user_id || !assignment.is_effective(now) {
                continue;
            }
            let Some(role) = self.roles.get(&assignment.role_id) else {
                continue;
            };
            if role.is_active && !roles.iter().any(|r| r.id == role.id) {
                roles.push(role.clone());
            }
        }
        roles
    }

    fn effective_permissions(&self, user_id: UserId, now: OffsetDateTime) -> PermissionMap {
        let mut merged = PermissionMap::new();
        for role in self.effective_roles(user_id, now) {
            merged.merge(&role.permissions);
        }
        merged
    }
}

/// In-memory implementation of [`RolePermissionStore`] and [`RoleAdminStore`].
///
/// Roles are keyed by id with a unique name index. Rate windows are kept by a
/// [`SlidingWindowLimiter`], and access-denied rows are retained for
/// inspection.
pub struct InMemoryRoleStore {
    state: RwLock<StoreState>,
    limiter: SlidingWindowLimiter,
    denied: RwLock<Vec<AccessDeniedRecord>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRoleStore {
    /// Creates an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store on `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::from_state(StoreState::default(), clock)
    }

    /// Creates a store seeded with the built-in system roles.
    pub fn with_default_roles(clock: Arc<dyn Clock>) -> Self {
        let mut state = StoreState::default();
        for role in default_roles() {
            state.names.insert(role.name.clone(), role.id);
            state.roles.insert(role.id, role);
        }
        Self::from_state(state, clock)
    }

    pub(crate) fn from_state(state: StoreState, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(state),
            limiter: SlidingWindowLimiter::new(),
            denied: RwLock::new(Vec::new()),
            clock,
        }
    }

    /// Returns every access-denied row logged so far.
    pub async fn access_denied_log(&self) -> Vec<AccessDeniedRecord> {
        self.denied.read().await.clone()
    }

    /// Returns the rate windows.
    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }
}

impl Default for InMemoryRoleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryRoleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRoleStore")
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// RolePermissionStore
// =============================================================================

#[async_trait]
impl RolePermissionStore for InMemoryRoleStore {
    async fn get_user_role(&self, user_id: UserId) -> AuthzResult<String> {
        let roles = self.get_user_roles(user_id).await?;
        Ok(highest_role(&roles).map_or_else(|| DEFAULT_ROLE.to_string(), |r| r.name.clone()))
    }

    async fn get_user_roles(&self, user_id: UserId) -> AuthzResult<Vec<Role>> {
        let now = self.clock.now();
        Ok(self.state.read().await.effective_roles(user_id, now))
    }

    async fn get_user_permissions(&self, user_id: UserId) -> AuthzResult<PermissionMap> {
        let now = self.clock.now();
        Ok(self.state.read().await.effective_permissions(user_id, now))
    }

    async fn check_user_permission(
        &self,
        user_id: UserId,
        resource: &ResourceId,
        action: &ActionId,
    ) -> AuthzResult<bool> {
        Ok(self
            .get_user_permissions(user_id)
            .await?
            .allows(resource, action))
    }

    async fn authorize_operation(&self, check: &OperationCheck) -> AuthzResult<bool> {
        if check.rate_limit_check {
            let key = RateKey {
                tier: RateTier::Authoritative,
                user_id: check.user_id,
                action: check.action.clone(),
                resource: check.resource.clone(),
                ip_address: None,
            };
            if !self.limiter.admit(
                key,
                check.max_requests,
                check.window_minutes,
                self.clock.now(),
            ) {
                return Ok(false);
            }
        }
        self.check_user_permission(check.user_id, &check.resource, &check.action)
            .await
    }

    async fn check_rate_limit(&self, check: &RateLimitCheck) -> AuthzResult<bool> {
        let key = RateKey {
            tier: RateTier::FastPath,
            user_id: check.user_id,
            action: check.action.clone(),
            resource: check.resource.clone(),
            ip_address: check.ip_address,
        };
        Ok(self.limiter.admit(
            key,
            check.max_requests,
            check.window_minutes,
            self.clock.now(),
        ))
    }

    async fn log_access_denied(&self, record: &AccessDeniedRecord) -> AuthzResult<()> {
        tracing::info!(
            user_id = ?record.user_id,
            resource = %record.resource,
            action = %record.action,
            reason = %record.reason,
            "Access denied"
        );
        self.denied.write().await.push(record.clone());
        Ok(())
    }
}

// =============================================================================
// RoleAdminStore
// =============================================================================

#[async_trait]
impl RoleAdminStore for InMemoryRoleStore {
    async fn list_roles(&self) -> AuthzResult<Vec<Role>> {
        Ok(self.state.read().await.roles.values().cloned().collect())
    }

    async fn find_role(&self, role_id: Uuid) -> AuthzResult<Option<Role>> {
        Ok(self.state.read().await.roles.get(&role_id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> AuthzResult<Option<Role>> {
        Ok(self.state.read().await.role_by_name(name).cloned())
    }

    async fn create_role(&self, role: &Role) -> AuthzResult<()> {
        self.state.write().await.insert_role(role.clone())
    }

    async fn update_role(&self, role: &Role) -> AuthzResult<()> {
        let mut state = self.state.write().await;
        let Some(existing) = state.roles.get(&role.id) else {
            return Err(AuthzError::not_found(format!("role {}", role.id)));
        };

        if existing.name != role.name {
            if state.names.contains_key(&role.name) {
                return Err(AuthzError::conflict(format!(
                    "role '{}' already exists",
                    role.name
                )));
            }
            let old_name = existing.name.clone();
            state.names.remove(&old_name);
            state.names.insert(role.name.clone(), role.id);
        }
        state.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn delete_role(&self, role_id: Uuid) -> AuthzResult<()> {
        let mut state = self.state.write().await;
        let Some(role) = state.roles.get(&role_id) else {
            return Err(AuthzError::not_found(format!("role {role_id}")));
        };
        if role.is_system_role {
            return Err(AuthzError::forbidden(format!(
                "system role '{}' cannot be deleted",
                role.name
            )));
        }

        let name = role.name.clone();
        state.roles.remove(&role_id);
        state.names.remove(&name);
        state.assignments.retain(|a| a.role_id != role_id);
        Ok(())
    }

    async fn assign_role(&self, assignment: &UserRoleAssignment) -> AuthzResult<()> {
        let mut state = self.state.write().await;
        if !state.roles.contains_key(&assignment.role_id) {
            return Err(AuthzError::not_found(format!("role {}", assignment.role_id)));
        }
        state.assignments.push(assignment.clone());
        Ok(())
    }

    async fn revoke_role(
        &self,
        user_id: UserId,
        role_id: Uuid,
        at: OffsetDateTime,
    ) -> AuthzResult<usize> {
        let mut state = self.state.write().await;
        let mut revoked = 0;
        for assignment in state
            .assignments
            .iter_mut()
            .filter(|a| a.user_id == user_id && a.role_id == role_id && a.is_active)
        {
            assignment.is_active = false;
            revoked += 1;
        }
        tracing::debug!(user_id = %user_id, role_id = %role_id, revoked, at = %at, "Assignments revoked");
        Ok(revoked)
    }

    async fn list_assignments(&self, user_id: UserId) -> AuthzResult<Vec<UserRoleAssignment>> {
        Ok(self
            .state
            .read()
            .await
            .assignments
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdesk_authz::ManualClock;
    use time::Duration;

    async fn assign(store: &InMemoryRoleStore, user: UserId, role: &str, now: OffsetDateTime) {
        let role = store.find_role_by_name(role).await.unwrap().unwrap();
        store
            .assign_role(&UserRoleAssignment::new(user, role.id, user, now))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_default_role_when_unassigned() {
        let store = InMemoryRoleStore::with_default_roles(Arc::new(ManualClock::default()));
        let user = Uuid::new_v4();
        assert_eq!(store.get_user_role(user).await.unwrap(), "user");
        assert!(store.get_user_permissions(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_permissions_are_union_of_roles() {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryRoleStore::with_default_roles(clock.clone());
        let user = Uuid::new_v4();
        assign(&store, user, "agent", clock.now()).await;
        assign(&store, user, "manager", clock.now()).await;

        assert_eq!(store.get_user_role(user).await.unwrap(), "manager");
        let perms = store.get_user_permissions(user).await.unwrap();
        assert!(perms.allows(&ResourceId::Whatsapp, &ActionId::Send));
        assert!(perms.allows(&ResourceId::Flows, &ActionId::Execute));
        assert!(!perms.allows(&ResourceId::Billing, &ActionId::Read));
    }

    #[tokio::test]
    async fn test_expired_assignment_is_ignored() {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryRoleStore::with_default_roles(clock.clone());
        let user = Uuid::new_v4();
        let role = store.find_role_by_name("admin").await.unwrap().unwrap();
        store
            .assign_role(
                &UserRoleAssignment::new(user, role.id, user, clock.now())
                    .expiring_at(clock.now() + Duration::hours(1)),
            )
            .await
            .unwrap();

        assert_eq!(store.get_user_role(user).await.unwrap(), "admin");
        clock.advance(Duration::hours(1));
        assert_eq!(store.get_user_role(user).await.unwrap(), "user");
    }

    #[tokio::test]
    async fn test_inactive_role_grants_nothing() {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryRoleStore::with_default_roles(clock.clone());
        let user = Uuid::new_v4();
        assign(&store, user, "agent", clock.now()).await;

        let mut agent = store.find_role_by_name("agent").await.unwrap().unwrap();
        agent.is_active = false;
        store.update_role(&agent).await.unwrap();

        assert!(store.get_user_roles(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_authorize_operation_with_store_rate_check() {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryRoleStore::with_default_roles(clock.clone());
        let user = Uuid::new_v4();
        assign(&store, user, "agent", clock.now()).await;

        let check = OperationCheck {
            resource: ResourceId::Contacts,
            action: ActionId::Create,
            user_id: user,
            rate_limit_check: true,
            max_requests: 1,
            window_minutes: 60,
        };
        assert!(store.authorize_operation(&check).await.unwrap());
        assert!(!store.authorize_operation(&check).await.unwrap());

        let unchecked = OperationCheck {
            rate_limit_check: false,
            ..check
        };
        assert!(store.authorize_operation(&unchecked).await.unwrap());
    }

    #[tokio::test]
    async fn test_fast_path_and_authoritative_windows_are_separate() {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryRoleStore::with_default_roles(clock.clone());
        let user = Uuid::new_v4();
        assign(&store, user, "agent", clock.now()).await;

        let fast = RateLimitCheck {
            user_id: user,
            ip_address: None,
            action: ActionId::Create,
            resource: ResourceId::Contacts,
            max_requests: 1,
            window_minutes: 60,
        };
        let authoritative = OperationCheck {
            resource: ResourceId::Contacts,
            action: ActionId::Create,
            user_id: user,
            rate_limit_check: true,
            max_requests: 1,
            window_minutes: 60,
        };

        // One request through both tiers is charged once in each.
        assert!(store.check_rate_limit(&fast).await.unwrap());
        assert!(store.authorize_operation(&authoritative).await.unwrap());

        assert!(!store.check_rate_limit(&fast).await.unwrap());
        assert!(!store.authorize_operation(&authoritative).await.unwrap());
        assert_eq!(store.limiter().tracked_keys(), 2);
    }

    #[tokio::test]
    async fn test_role_name_uniqueness_and_rename() {
        let store = InMemoryRoleStore::with_default_roles(Arc::new(ManualClock::default()));
        let err = store.create_role(&Role::new("admin", 9)).await.unwrap_err();
        assert!(matches!(err, AuthzError::Conflict { .. }));

        let mut custom = Role::new("reviewer", 4);
        store.create_role(&custom).await.unwrap();
        custom.name = "approver".to_string();
        store.update_role(&custom).await.unwrap();

        assert!(store.find_role_by_name("reviewer").await.unwrap().is_none());
        assert!(store.find_role_by_name("approver").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_role_removes_assignments() {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryRoleStore::with_default_roles(clock.clone());
        let user = Uuid::new_v4();
        let custom = Role::builder("reviewer", 4).grant("documents", "update").build();
        store.create_role(&custom).await.unwrap();
        assign(&store, user, "reviewer", clock.now()).await;

        store.delete_role(custom.id).await.unwrap();
        assert!(store.list_assignments(user).await.unwrap().is_empty());

        let system = store.find_role_by_name("user").await.unwrap().unwrap();
        let err = store.delete_role(system.id).await.unwrap_err();
        assert!(matches!(err, AuthzError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_revoke_counts_active_assignments() {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryRoleStore::with_default_roles(clock.clone());
        let user = Uuid::new_v4();
        assign(&store, user, "agent", clock.now()).await;
        assign(&store, user, "agent", clock.now()).await;
        let agent = store.find_role_by_name("agent").await.unwrap().unwrap();

        assert_eq!(store.revoke_role(user, agent.id, clock.now()).await.unwrap(), 2);
        assert_eq!(store.revoke_role(user, agent.id, clock.now()).await.unwrap(), 0);
        assert_eq!(store.list_assignments(user).await.unwrap().len(), 2);
    }
}
