//! Authorization audit trail.
//!
//! Every decision the engine reaches can be recorded as an [`AuditEvent`]:
//!
//! - denials (unauthenticated, rate-limited, insufficient permissions,
//!   store and system errors) as high-severity security events
//! - grants as low-severity usage events
//!
//! Recording is best-effort. A sink failure never changes the verdict that
//! was already computed; it is reported through `tracing` only.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthzResult;
use crate::config::{AuditConfig, AuditDispatch};
use crate::error::DenialReason;
use crate::storage::{AccessDeniedRecord, RolePermissionStore};
use crate::types::{ActionId, AuthorizationContext, DecisionMethod, ResourceId, UserId};

// =============================================================================
// Event Types
// =============================================================================

/// What an audit event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A request was denied.
    UnauthorizedAttempt(DenialReason),
    /// A request was granted.
    AuthorizedAccess,
}

impl AuditEventType {
    /// Returns the event name stored by sinks.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnauthorizedAttempt(reason) => reason.event_type(),
            Self::AuthorizedAccess => "authorized_access",
        }
    }
}

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    /// Routine usage.
    Low,
    /// Worth a look.
    Medium,
    /// Security relevant.
    High,
}

/// A recorded authorization event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event id.
    pub id: Uuid,

    /// What happened.
    pub event_type: AuditEventType,

    /// How much it matters.
    pub severity: AuditSeverity,

    /// Caller, when known.
    pub user_id: Option<UserId>,

    /// Protected resource.
    pub resource: ResourceId,

    /// Requested action.
    pub action: ActionId,

    /// Specific record the caller targeted.
    pub resource_id: Option<String>,

    /// Denial text, for denials.
    pub reason: Option<String>,

    /// Caller's highest role, for grants.
    pub role: Option<String>,

    /// How the grant was reached, for grants.
    pub method: Option<DecisionMethod>,

    /// Client IP.
    pub ip_address: Option<IpAddr>,

    /// Client user agent.
    pub user_agent: Option<String>,

    /// When the event was built.
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

impl AuditEvent {
    /// Returns `true` if this event records a denial.
    #[must_use]
    pub fn is_denial(&self) -> bool {
        matches!(self.event_type, AuditEventType::UnauthorizedAttempt(_))
    }
}

/// Builder for creating audit events.
#[derive(Debug, Clone)]
pub struct AuditEventBuilder {
    event: AuditEvent,
}

impl AuditEventBuilder {
    /// An unauthorized-attempt event (high severity).
    pub fn unauthorized(reason: DenialReason, resource: ResourceId, action: ActionId) -> Self {
        let mut builder = Self::new(AuditEventType::UnauthorizedAttempt(reason), resource, action);
        builder.event.severity = AuditSeverity::High;
        builder.event.reason = Some(reason.message().to_string());
        builder
    }

    /// An authorized-access event (low severity).
    pub fn authorized(resource: ResourceId, action: ActionId) -> Self {
        Self::new(AuditEventType::AuthorizedAccess, resource, action)
    }

    fn new(event_type: AuditEventType, resource: ResourceId, action: ActionId) -> Self {
        Self {
            event: AuditEvent {
                id: Uuid::new_v4(),
                event_type,
                severity: AuditSeverity::Low,
                user_id: None,
                resource,
                action,
                resource_id: None,
                reason: None,
                role: None,
                method: None,
                ip_address: None,
                user_agent: None,
                recorded_at: OffsetDateTime::now_utc(),
            },
        }
    }

    /// Set the caller.
    pub fn user(mut self, user_id: Option<UserId>) -> Self {
        self.event.user_id = user_id;
        self
    }

    /// Set the targeted record.
    pub fn resource_id(mut self, resource_id: Option<String>) -> Self {
        self.event.resource_id = resource_id;
        self
    }

    /// Set the caller's role.
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.event.role = Some(role.into());
        self
    }

    /// Set the decision method.
    pub fn method(mut self, method: DecisionMethod) -> Self {
        self.event.method = Some(method);
        self
    }

    /// Set the client IP and user agent.
    pub fn source(mut self, ip_address: Option<IpAddr>, user_agent: Option<String>) -> Self {
        self.event.ip_address = ip_address;
        self.event.user_agent = user_agent;
        self
    }

    /// Copy user, IP and user agent from a resolved context.
    pub fn context(self, context: &AuthorizationContext) -> Self {
        self.user(Some(context.user_id))
            .source(context.ip_address, context.user_agent.clone())
    }

    /// Override the timestamp.
    pub fn recorded_at(mut self, at: OffsetDateTime) -> Self {
        self.event.recorded_at = at;
        self
    }

    /// Build the event.
    pub fn build(self) -> AuditEvent {
        self.event
    }
}

// =============================================================================
// Sink
// =============================================================================

/// Durable destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persists one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails. Callers swallow it.
    async fn record(&self, event: &AuditEvent) -> AuthzResult<()>;
}

/// Sink that writes denials through the store's `log_access_denied` call.
///
/// Grants have no durable counterpart in the store and are only traced.
pub struct StoreAuditSink {
    store: Arc<dyn RolePermissionStore>,
}

impl StoreAuditSink {
    /// Wraps `store`.
    #[must_use]
    pub fn new(store: Arc<dyn RolePermissionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuditSink for StoreAuditSink {
    async fn record(&self, event: &AuditEvent) -> AuthzResult<()> {
        if !event.is_denial() {
            tracing::trace!(
                user_id = ?event.user_id,
                resource = %event.resource,
                action = %event.action,
                method = ?event.method,
                "Authorized access"
            );
            return Ok(());
        }

        let record = AccessDeniedRecord {
            user_id: event.user_id,
            action: event.action.clone(),
            resource: event.resource.clone(),
            resource_id: event.resource_id.clone(),
            reason: event.reason.clone().unwrap_or_default(),
            ip_address: event.ip_address,
            user_agent: event.user_agent.clone(),
        };
        self.store.log_access_denied(&record).await
    }
}

// =============================================================================
// Emitter
// =============================================================================

/// Fire-and-forget audit emitter.
#[derive(Clone)]
pub struct AuditEmitter {
    sink: Arc<dyn AuditSink>,
    config: AuditConfig,
}

impl AuditEmitter {
    /// Creates an emitter writing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>, config: AuditConfig) -> Self {
        Self { sink, config }
    }

    /// Records a denial as a high-severity security event.
    pub async fn log_unauthorized_attempt(
        &self,
        reason: DenialReason,
        resource: &ResourceId,
        action: &ActionId,
        user_id: Option<UserId>,
        resource_id: Option<String>,
        context: Option<&AuthorizationContext>,
    ) {
        if !self.config.enabled || !self.config.log_unauthorized_attempts {
            return;
        }

        let mut builder = AuditEventBuilder::unauthorized(reason, resource.clone(), action.clone())
            .resource_id(resource_id);
        builder = match context {
            Some(context) => builder.context(context),
            None => builder.user(user_id),
        };

        tracing::warn!(
            user_id = ?user_id,
            resource = %resource,
            action = %action,
            event = reason.event_type(),
            "Unauthorized access attempt"
        );

        self.dispatch(builder.build()).await;
    }

    /// Records a grant as a low-severity usage event.
    pub async fn log_authorized_access(
        &self,
        resource: &ResourceId,
        action: &ActionId,
        context: &AuthorizationContext,
        method: DecisionMethod,
        resource_id: Option<String>,
    ) {
        if !self.config.enabled || !self.config.log_authorized_access {
            return;
        }

        let event = AuditEventBuilder::authorized(resource.clone(), action.clone())
            .context(context)
            .role(context.user_role.clone())
            .method(method)
            .resource_id(resource_id)
            .build();

        self.dispatch(event).await;
    }

    async fn dispatch(&self, event: AuditEvent) {
        match self.config.dispatch {
            AuditDispatch::Inline => write_event(self.sink.as_ref(), &event).await,
            AuditDispatch::Spawn => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let sink = self.sink.clone();
                    handle.spawn(async move { write_event(sink.as_ref(), &event).await });
                }
                // Outside a runtime there is nothing to spawn onto.
                Err(_) => write_event(self.sink.as_ref(), &event).await,
            },
        }
    }
}

async fn write_event(sink: &dyn AuditSink, event: &AuditEvent) {
    if let Err(e) = sink.record(event).await {
        tracing::warn!(
            error = %e,
            event_id = %event.id,
            event = event.event_type.as_str(),
            "Failed to record audit event"
        );
    }
}

impl std::fmt::Debug for AuditEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditEmitter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthzError;
    use crate::storage::{OperationCheck, RateLimitCheck};
    use crate::types::{PermissionMap, Role};
    use std::sync::Mutex;

    // -------------------------------------------------------------------------
    // Mock Sinks
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<AuditEvent>>,
    }

    #[async_trait]
    impl AuditSink for RecordingSink {
        async fn record(&self, event: &AuditEvent) -> AuthzResult<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn record(&self, _event: &AuditEvent) -> AuthzResult<()> {
            Err(AuthzError::store("audit table unavailable"))
        }
    }

    #[derive(Default)]
    struct DeniedLogStore {
        records: Mutex<Vec<AccessDeniedRecord>>,
    }

    #[async_trait]
    impl RolePermissionStore for DeniedLogStore {
        async fn get_user_role(&self, _user_id: UserId) -> AuthzResult<String> {
            unimplemented!()
        }

        async fn get_user_roles(&self, _user_id: UserId) -> AuthzResult<Vec<Role>> {
            unimplemented!()
        }

        async fn get_user_permissions(&self, _user_id: UserId) -> AuthzResult<PermissionMap> {
            unimplemented!()
        }

        async fn check_user_permission(
            &self,
            _user_id: UserId,
            _resource: &ResourceId,
            _action: &ActionId,
        ) -> AuthzResult<bool> {
            unimplemented!()
        }

        async fn authorize_operation(&self, _check: &OperationCheck) -> AuthzResult<bool> {
            unimplemented!()
        }

        async fn check_rate_limit(&self, _check: &RateLimitCheck) -> AuthzResult<bool> {
            unimplemented!()
        }

        async fn log_access_denied(&self, record: &AccessDeniedRecord) -> AuthzResult<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn inline_config() -> AuditConfig {
        AuditConfig {
            dispatch: AuditDispatch::Inline,
            ..AuditConfig::default()
        }
    }

    fn context() -> AuthorizationContext {
        AuthorizationContext {
            user_id: Uuid::new_v4(),
            user_role: "manager".to_string(),
            roles: ["manager".to_string()].into_iter().collect(),
            permissions: PermissionMap::new(),
            ip_address: Some("198.51.100.4".parse().unwrap()),
            user_agent: Some("console/3.0".to_string()),
        }
    }

    // -------------------------------------------------------------------------
    // Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_unauthorized_attempt_is_high_severity() {
        let sink = Arc::new(RecordingSink::default());
        let emitter = AuditEmitter::new(sink.clone(), inline_config());
        let user = Uuid::new_v4();

        emitter
            .log_unauthorized_attempt(
                DenialReason::InsufficientPermissions,
                &ResourceId::Documents,
                &ActionId::Create,
                Some(user),
                Some("doc-42".to_string()),
                None,
            )
            .await;

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.severity, AuditSeverity::High);
        assert_eq!(event.event_type.as_str(), "insufficient_permissions");
        assert_eq!(event.reason.as_deref(), Some("Permissões insuficientes"));
        assert_eq!(event.user_id, Some(user));
        assert_eq!(event.resource_id.as_deref(), Some("doc-42"));
    }

    #[tokio::test]
    async fn test_authorized_access_tags_role_and_method() {
        let sink = Arc::new(RecordingSink::default());
        let emitter = AuditEmitter::new(sink.clone(), inline_config());
        let ctx = context();

        emitter
            .log_authorized_access(
                &ResourceId::Flows,
                &ActionId::Execute,
                &ctx,
                DecisionMethod::RbacCheck,
                None,
            )
            .await;

        let events = sink.events.lock().unwrap();
        let event = &events[0];
        assert_eq!(event.event_type, AuditEventType::AuthorizedAccess);
        assert_eq!(event.severity, AuditSeverity::Low);
        assert_eq!(event.role.as_deref(), Some("manager"));
        assert_eq!(event.method, Some(DecisionMethod::RbacCheck));
        assert_eq!(event.ip_address, ctx.ip_address);
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let emitter = AuditEmitter::new(Arc::new(FailingSink), inline_config());
        // Must complete without panicking or propagating.
        emitter
            .log_authorized_access(
                &ResourceId::Flows,
                &ActionId::Read,
                &context(),
                DecisionMethod::AdminBypass,
                None,
            )
            .await;
    }

    #[tokio::test]
    async fn test_toggles_suppress_events() {
        let sink = Arc::new(RecordingSink::default());
        let config = AuditConfig {
            log_authorized_access: false,
            ..inline_config()
        };
        let emitter = AuditEmitter::new(sink.clone(), config);

        emitter
            .log_authorized_access(
                &ResourceId::Flows,
                &ActionId::Read,
                &context(),
                DecisionMethod::RbacCheck,
                None,
            )
            .await;
        assert!(sink.events.lock().unwrap().is_empty());

        let disabled = AuditEmitter::new(
            sink.clone(),
            AuditConfig {
                enabled: false,
                ..inline_config()
            },
        );
        disabled
            .log_unauthorized_attempt(
                DenialReason::SystemError,
                &ResourceId::Flows,
                &ActionId::Read,
                None,
                None,
                None,
            )
            .await;
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_spawned_dispatch_eventually_records() {
        let sink = Arc::new(RecordingSink::default());
        let emitter = AuditEmitter::new(sink.clone(), AuditConfig::default());

        emitter
            .log_unauthorized_attempt(
                DenialReason::Unauthenticated,
                &ResourceId::Users,
                &ActionId::Read,
                None,
                None,
                None,
            )
            .await;

        for _ in 0..10 {
            if !sink.events.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_sink_writes_denials_only() {
        let store = Arc::new(DeniedLogStore::default());
        let sink = StoreAuditSink::new(store.clone());
        let ctx = context();

        let denied = AuditEventBuilder::unauthorized(
            DenialReason::RateLimitExceeded,
            ResourceId::Contacts,
            ActionId::Import,
        )
        .context(&ctx)
        .build();
        let granted = AuditEventBuilder::authorized(ResourceId::Contacts, ActionId::Read)
            .context(&ctx)
            .build();

        sink.record(&denied).await.unwrap();
        sink.record(&granted).await.unwrap();

        let records = store.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reason, "Limite de requisições excedido");
        assert_eq!(records[0].user_id, Some(ctx.user_id));
        assert_eq!(records[0].user_agent.as_deref(), Some("console/3.0"));
    }
}
