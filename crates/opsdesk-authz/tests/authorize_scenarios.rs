//! End-to-end authorization scenarios against the in-memory backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use opsdesk_authz::config::{AuditConfig, AuditDispatch};
use opsdesk_authz::hierarchy::highest_role;
use opsdesk_authz::{
    AccessDeniedRecord, ActionId, AuthorizeOptions, Authorizer, AuthzConfig, AuthzResult, Clock,
    DecisionMethod, ManualClock, OperationCheck, PermissionCache, PermissionMap, RateLimitCheck,
    RateLimitProfile, ResourceId, Role, RoleManager, RolePermissionStore, Session, StaticSession,
    StoreAuditSink, UserId,
};
use opsdesk_authz_memory::{InMemoryAuditSink, InMemoryRoleStore};
use time::Duration;
use uuid::Uuid;

// =============================================================================
// Counting wrapper
// =============================================================================

/// Delegates to the in-memory store and counts the calls the engine makes.
struct CountingStore {
    inner: Arc<InMemoryRoleStore>,
    context_loads: AtomicUsize,
    operation_checks: AtomicUsize,
    rate_checks: AtomicUsize,
    /// Admit every request at the fast-path rate check.
    lenient_rate_checks: AtomicBool,
}

impl CountingStore {
    fn new(inner: Arc<InMemoryRoleStore>) -> Self {
        Self {
            inner,
            context_loads: AtomicUsize::new(0),
            operation_checks: AtomicUsize::new(0),
            rate_checks: AtomicUsize::new(0),
            lenient_rate_checks: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl RolePermissionStore for CountingStore {
    async fn get_user_role(&self, user_id: UserId) -> AuthzResult<String> {
        self.inner.get_user_role(user_id).await
    }

    async fn get_user_roles(&self, user_id: UserId) -> AuthzResult<Vec<Role>> {
        self.context_loads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_user_roles(user_id).await
    }

    async fn get_user_permissions(&self, user_id: UserId) -> AuthzResult<PermissionMap> {
        self.inner.get_user_permissions(user_id).await
    }

    async fn check_user_permission(
        &self,
        user_id: UserId,
        resource: &ResourceId,
        action: &ActionId,
    ) -> AuthzResult<bool> {
        self.inner
            .check_user_permission(user_id, resource, action)
            .await
    }

    async fn authorize_operation(&self, check: &OperationCheck) -> AuthzResult<bool> {
        self.operation_checks.fetch_add(1, Ordering::SeqCst);
        self.inner.authorize_operation(check).await
    }

    async fn check_rate_limit(&self, check: &RateLimitCheck) -> AuthzResult<bool> {
        self.rate_checks.fetch_add(1, Ordering::SeqCst);
        if self.lenient_rate_checks.load(Ordering::SeqCst) {
            return Ok(true);
        }
        self.inner.check_rate_limit(check).await
    }

    async fn log_access_denied(&self, record: &AccessDeniedRecord) -> AuthzResult<()> {
        self.inner.log_access_denied(record).await
    }
}

// =============================================================================
// Fixture
// =============================================================================

struct World {
    clock: Arc<ManualClock>,
    memory: Arc<InMemoryRoleStore>,
    store: Arc<CountingStore>,
    cache: Arc<PermissionCache>,
    sink: Arc<InMemoryAuditSink>,
    roles: RoleManager,
}

impl World {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::default());
        let memory = Arc::new(InMemoryRoleStore::with_default_roles(clock.clone()));
        let store = Arc::new(CountingStore::new(memory.clone()));
        let cache = Arc::new(PermissionCache::new(Duration::minutes(5), clock.clone()));
        let roles = RoleManager::new(memory.clone(), cache.clone(), clock.clone());
        Self {
            clock,
            memory,
            store,
            cache,
            sink: Arc::new(InMemoryAuditSink::new()),
            roles,
        }
    }

    fn authorizer_for(&self, session: Option<Session>) -> Authorizer {
        let sessions = match session {
            Some(session) => StaticSession::signed_in(session),
            None => StaticSession::anonymous(),
        };
        let config = AuthzConfig {
            audit: AuditConfig {
                dispatch: AuditDispatch::Inline,
                ..AuditConfig::default()
            },
            ..AuthzConfig::default()
        };
        Authorizer::builder(self.store.clone(), Arc::new(sessions))
            .config(config)
            .cache(self.cache.clone())
            .audit_sink(self.sink.clone())
            .build()
            .unwrap()
    }

    async fn user_with(&self, roles: &[&str]) -> (UserId, Authorizer) {
        let user = Uuid::new_v4();
        for role in roles {
            self.roles.assign_role(user, role, user, None).await.unwrap();
        }
        (user, self.authorizer_for(Some(Session::new(user))))
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn unauthenticated_call_is_denied() {
    let world = World::new();
    let authorizer = world.authorizer_for(None);

    let decision = authorizer
        .authorize(AuthorizeOptions::new("users", "read"))
        .await;

    assert!(!decision.authorized);
    assert_eq!(decision.reason_text(), Some("Usuário não autenticado"));
    assert_eq!(world.sink.event_types().await, ["authentication_required"]);
}

#[tokio::test]
async fn admin_is_granted_anything_without_store_checks() {
    let world = World::new();
    let (_, authorizer) = world.user_with(&["admin"]).await;

    let options = AuthorizeOptions::new("webhooks", "execute")
        .rate_limit(authorizer.rate_limit(RateLimitProfile::Sensitive));
    let decision = authorizer.authorize(options).await;

    assert!(decision.authorized);
    assert_eq!(decision.method, Some(DecisionMethod::AdminBypass));
    assert_eq!(decision.context.unwrap().user_role, "admin");
    assert_eq!(world.store.rate_checks.load(Ordering::SeqCst), 0);
    assert_eq!(world.store.operation_checks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn user_without_grant_is_denied_by_authoritative_check() {
    let world = World::new();
    let (user, authorizer) = world.user_with(&["user"]).await;

    let decision = authorizer
        .authorize(AuthorizeOptions::new("documents", "create").resource_id("doc-1"))
        .await;

    assert!(!decision.authorized);
    assert_eq!(decision.reason_text(), Some("Permissões insuficientes"));
    assert_eq!(world.store.operation_checks.load(Ordering::SeqCst), 1);

    // The default sink here is the in-memory one; the store sink writes rows.
    let store_sink = StoreAuditSink::new(world.memory.clone());
    let event = world.sink.denials().await.remove(0);
    opsdesk_authz::AuditSink::record(&store_sink, &event).await.unwrap();
    let rows = world.memory.access_denied_log().await;
    assert_eq!(rows[0].user_id, Some(user));
    assert_eq!(rows[0].resource_id.as_deref(), Some("doc-1"));
}

#[tokio::test]
async fn eleventh_bulk_request_within_the_hour_is_rate_limited() {
    let world = World::new();
    let (_, authorizer) = world.user_with(&["agent"]).await;
    let bulk = authorizer.rate_limit(RateLimitProfile::BulkOperations);

    for i in 0..10 {
        let decision = authorizer
            .authorize(AuthorizeOptions::new("contacts", "create").rate_limit(bulk))
            .await;
        assert!(decision.authorized, "request {} should pass", i + 1);
        world.clock.advance(Duration::minutes(5));
    }

    let decision = authorizer
        .authorize(AuthorizeOptions::new("contacts", "create").rate_limit(bulk))
        .await;
    assert_eq!(decision.reason_text(), Some("Limite de requisições excedido"));
    // The authoritative check ran for the ten admitted requests only.
    assert_eq!(world.store.operation_checks.load(Ordering::SeqCst), 10);

    // Once the first request leaves the window, a new one fits.
    world.clock.advance(Duration::minutes(10));
    let decision = authorizer
        .authorize(AuthorizeOptions::new("contacts", "create").rate_limit(bulk))
        .await;
    assert!(decision.authorized);
}

#[tokio::test]
async fn authoritative_check_enforces_budget_without_fast_path() {
    let world = World::new();
    world.store.lenient_rate_checks.store(true, Ordering::SeqCst);
    let (_, authorizer) = world.user_with(&["agent"]).await;
    let bulk = authorizer.rate_limit(RateLimitProfile::BulkOperations);

    for _ in 0..10 {
        let decision = authorizer
            .authorize(AuthorizeOptions::new("contacts", "create").rate_limit(bulk))
            .await;
        assert!(decision.authorized);
    }

    let decision = authorizer
        .authorize(AuthorizeOptions::new("contacts", "create").rate_limit(bulk))
        .await;
    assert!(!decision.authorized);
    assert_eq!(world.store.operation_checks.load(Ordering::SeqCst), 11);

    // Calls without a budget are not charged against the window.
    let decision = authorizer
        .authorize(AuthorizeOptions::new("contacts", "create"))
        .await;
    assert!(decision.authorized);
}

#[tokio::test]
async fn revocation_is_visible_to_the_next_check() {
    let world = World::new();
    let (user, authorizer) = world.user_with(&["manager"]).await;
    let options = AuthorizeOptions::new("flows", "execute");

    let decision = authorizer.authorize(options.clone()).await;
    assert!(decision.authorized);
    assert_eq!(decision.context.unwrap().user_role, "manager");

    world.roles.revoke_role(user, "manager").await.unwrap();

    let decision = authorizer.authorize(options).await;
    assert!(!decision.authorized);
    let context = decision.context.unwrap();
    assert_eq!(context.user_role, "user");
    assert!(context.roles.is_empty());
    assert_eq!(world.store.context_loads.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test]
async fn cached_context_honors_ttl() {
    let world = World::new();
    let (_, authorizer) = world.user_with(&["agent"]).await;
    let options = AuthorizeOptions::new("conversations", "read");

    authorizer.authorize(options.clone()).await;
    assert_eq!(world.store.context_loads.load(Ordering::SeqCst), 1);

    world.clock.advance(Duration::minutes(4) + Duration::seconds(59));
    authorizer.authorize(options.clone()).await;
    assert_eq!(world.store.context_loads.load(Ordering::SeqCst), 1);

    world.clock.advance(Duration::seconds(2));
    authorizer.authorize(options).await;
    assert_eq!(world.store.context_loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn role_update_flushes_every_cached_context() {
    let world = World::new();
    let (_, first) = world.user_with(&["agent"]).await;
    let (_, second) = world.user_with(&["agent"]).await;

    assert!(!first.has_permission("flows", "read").await);
    assert!(!second.has_permission("flows", "read").await);

    let mut agent = world
        .roles
        .list_roles()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.name == "agent")
        .unwrap();
    agent.permissions.grant("flows", "read");
    world.roles.update_role(agent).await.unwrap();

    assert!(first.has_permission("flows", "read").await);
    assert!(second.has_permission("flows", "read").await);
}

#[tokio::test]
async fn effective_permissions_are_the_union_of_roles() {
    let world = World::new();
    world
        .roles
        .create_role(Role::builder("reader", 6).grant("documents", "read").build())
        .await
        .unwrap();
    world
        .roles
        .create_role(Role::builder("writer", 6).grant("documents", "create").build())
        .await
        .unwrap();
    let (user, authorizer) = world.user_with(&["reader", "writer"]).await;

    let context = authorizer
        .resolve_context(&Session::new(user))
        .await
        .unwrap();
    let actions: Vec<_> = context
        .permissions
        .actions(&ResourceId::Documents)
        .unwrap()
        .iter()
        .map(|a| a.as_str().to_string())
        .collect();
    assert_eq!(actions, ["read", "create"]);
}

#[tokio::test]
async fn expired_assignment_stops_counting() {
    let world = World::new();
    let user = Uuid::new_v4();
    let expires = world.clock.now() + Duration::minutes(30);
    world
        .roles
        .assign_role(user, "admin", user, Some(expires))
        .await
        .unwrap();
    let authorizer = world.authorizer_for(Some(Session::new(user)));

    assert!(authorizer.authorize(AuthorizeOptions::new("billing", "read")).await.authorized);

    world.clock.advance(Duration::minutes(31));
    authorizer.invalidate_user(user).await;
    let decision = authorizer.authorize(AuthorizeOptions::new("billing", "read")).await;
    assert!(!decision.authorized);
}

#[tokio::test]
async fn highest_role_ignores_input_order() {
    let world = World::new();
    let mut roles = world.roles.list_roles().await.unwrap();
    roles.retain(|r| [1, 2, 4].contains(&r.hierarchy_level));
    roles.reverse();
    assert_eq!(highest_role(&roles).unwrap().name, "super_admin");
}

#[tokio::test]
async fn audit_sink_failure_does_not_change_the_verdict() {
    struct Broken;

    #[async_trait]
    impl opsdesk_authz::AuditSink for Broken {
        async fn record(&self, _event: &opsdesk_authz::AuditEvent) -> AuthzResult<()> {
            Err(opsdesk_authz::AuthzError::store("audit down"))
        }
    }

    let world = World::new();
    let user = Uuid::new_v4();
    world.roles.assign_role(user, "agent", user, None).await.unwrap();
    let config = AuthzConfig {
        audit: AuditConfig {
            dispatch: AuditDispatch::Inline,
            ..AuditConfig::default()
        },
        ..AuthzConfig::default()
    };
    let authorizer = Authorizer::builder(
        world.store.clone(),
        Arc::new(StaticSession::signed_in(Session::new(user))),
    )
    .config(config)
    .audit_sink(Arc::new(Broken))
    .build()
    .unwrap();

    assert!(authorizer.authorize(AuthorizeOptions::new("conversations", "read")).await.authorized);
    assert!(!authorizer.authorize(AuthorizeOptions::new("billing", "read")).await.authorized);
}

#[tokio::test]
async fn store_audit_sink_is_the_default() {
    let world = World::new();
    let authorizer = Authorizer::builder(
        world.store.clone(),
        Arc::new(StaticSession::anonymous()),
    )
    .config(AuthzConfig {
        audit: AuditConfig {
            dispatch: AuditDispatch::Inline,
            ..AuditConfig::default()
        },
        ..AuthzConfig::default()
    })
    .build()
    .unwrap();

    authorizer
        .authorize(AuthorizeOptions::new("settings", "update"))
        .await;

    let rows = world.memory.access_denied_log().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].reason, "Usuário não autenticado");
    assert_eq!(rows[0].user_id, None);
}
