//! Authorization decision engine.
//!
//! Every call to [`Authorizer::authorize`] runs the same ordered pipeline:
//!
//! 1. Authenticate through the [`SessionProvider`]
//! 2. Resolve the caller's context (cache, then store)
//! 3. Admin bypass
//! 4. Rate limit (only when the call supplies an enabled budget)
//! 5. Authoritative check in the store
//! 6. Grant
//!
//! The pipeline is total: every failure, including a panic inside a
//! collaborator, ends in a denial. At most one audit event is emitted per call.
//!
//! # Example
//!
//! ```ignore
//! use opsdesk_authz::{AuthorizeOptions, Authorizer, RateLimitProfile};
//!
//! let authorizer = Authorizer::builder(store, sessions).config(config).build()?;
//!
//! let options = AuthorizeOptions::new("contacts", "import")
//!     .rate_limit(authorizer.rate_limit(RateLimitProfile::BulkOperations));
//! let decision = authorizer.authorize(options).await;
//! if !decision.authorized {
//!     return Err(decision.reason_text().unwrap_or_default());
//! }
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::AuthzResult;
use crate::audit::{AuditEmitter, AuditSink, StoreAuditSink};
use crate::cache::PermissionCache;
use crate::clock::{Clock, SystemClock};
use crate::config::{AuthzConfig, DecisionDefaults};
use crate::error::{AuthzError, DenialReason};
use crate::hierarchy;
use crate::rate_limit::{RateLimit, RateLimitProfile, RateLimiter};
use crate::session::SessionProvider;
use crate::storage::{OperationCheck, RolePermissionStore};
use crate::types::{
    ActionId, AuthorizationContext, AuthorizationDecision, DEFAULT_ROLE, DecisionMethod,
    ResourceId, Session, UserId,
};

// =============================================================================
// Options
// =============================================================================

/// Per-call options for [`Authorizer::authorize`].
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizeOptions {
    /// Protected resource.
    pub resource: ResourceId,

    /// Requested action.
    pub action: ActionId,

    /// Request budget to enforce before the authoritative check.
    pub rate_limit: Option<RateLimit>,

    /// Grant admin roles immediately. `None` uses the configured default.
    pub bypass_for_admin: Option<bool>,

    /// Emit an audit event for the decision. `None` uses the configured default.
    pub log_attempt: Option<bool>,

    /// Specific record targeted, carried into the audit trail.
    pub resource_id: Option<String>,
}

impl AuthorizeOptions {
    /// Options for `action` on `resource` with every default.
    pub fn new(resource: impl Into<ResourceId>, action: impl Into<ActionId>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            rate_limit: None,
            bypass_for_admin: None,
            log_attempt: None,
            resource_id: None,
        }
    }

    /// Enforce `limit`.
    #[must_use]
    pub fn rate_limit(mut self, limit: RateLimit) -> Self {
        self.rate_limit = Some(limit);
        self
    }

    /// Enable or disable the admin bypass.
    #[must_use]
    pub fn bypass_for_admin(mut self, bypass: bool) -> Self {
        self.bypass_for_admin = Some(bypass);
        self
    }

    /// Enable or disable audit emission.
    #[must_use]
    pub fn log_attempt(mut self, log: bool) -> Self {
        self.log_attempt = Some(log);
        self
    }

    /// Name the targeted record.
    #[must_use]
    pub fn resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Authorizer`].
pub struct AuthorizerBuilder {
    store: Arc<dyn RolePermissionStore>,
    sessions: Arc<dyn SessionProvider>,
    config: AuthzConfig,
    clock: Option<Arc<dyn Clock>>,
    cache: Option<Arc<PermissionCache>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
}

impl AuthorizerBuilder {
    /// Use `config` instead of the defaults.
    #[must_use]
    pub fn config(mut self, config: AuthzConfig) -> Self {
        self.config = config;
        self
    }

    /// Time source for the cache it creates. Ignored when a cache is supplied.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share an existing cache (e.g. with a [`RoleManager`](crate::RoleManager)).
    #[must_use]
    pub fn cache(mut self, cache: Arc<PermissionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Audit destination. Defaults to [`StoreAuditSink`] over the store.
    #[must_use]
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Builds the authorizer.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Configuration` if the configuration is invalid.
    pub fn build(self) -> AuthzResult<Authorizer> {
        self.config
            .validate()
            .map_err(|e| AuthzError::configuration(e.to_string()))?;

        let cache = self.cache.unwrap_or_else(|| {
            let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
            Arc::new(PermissionCache::from_config(&self.config.cache, clock))
        });
        let sink = self
            .audit_sink
            .unwrap_or_else(|| Arc::new(StoreAuditSink::new(self.store.clone())));

        Ok(Authorizer {
            rate_limiter: RateLimiter::new(self.store.clone(), self.config.rate_limits.clone()),
            audit: AuditEmitter::new(sink, self.config.audit.clone()),
            defaults: self.config.decisions.clone(),
            store: self.store,
            sessions: self.sessions,
            cache,
        })
    }
}

// =============================================================================
// Authorizer
// =============================================================================

/// Decides whether the current caller may perform an operation.
#[derive(Clone)]
pub struct Authorizer {
    store: Arc<dyn RolePermissionStore>,
    sessions: Arc<dyn SessionProvider>,
    cache: Arc<PermissionCache>,
    rate_limiter: RateLimiter,
    audit: AuditEmitter,
    defaults: DecisionDefaults,
}

impl Authorizer {
    /// Starts building an authorizer over `store` and `sessions`.
    pub fn builder(
        store: Arc<dyn RolePermissionStore>,
        sessions: Arc<dyn SessionProvider>,
    ) -> AuthorizerBuilder {
        AuthorizerBuilder {
            store,
            sessions,
            config: AuthzConfig::default(),
            clock: None,
            cache: None,
            audit_sink: None,
        }
    }

    /// Returns the shared permission cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    /// Returns the configured budget for `profile`.
    #[must_use]
    pub fn rate_limit(&self, profile: RateLimitProfile) -> RateLimit {
        self.rate_limiter.profile(profile)
    }

    /// Authorizes the caller returned by the session provider.
    ///
    /// Never fails: every error becomes a denial with a [`DenialReason`].
    pub async fn authorize(&self, options: AuthorizeOptions) -> AuthorizationDecision {
        self.guarded(&options, async {
            match self.sessions.current_session().await {
                Ok(session) => self.evaluate(session.as_ref(), &options).await,
                Err(e) => {
                    tracing::warn!(error = %e, "Session lookup failed");
                    self.deny(DenialReason::SystemError, &options, None, None)
                        .await
                }
            }
        })
        .await
    }

    /// Authorizes an explicitly supplied session.
    ///
    /// `None` is treated as an unauthenticated caller.
    pub async fn authorize_session(
        &self,
        session: Option<&Session>,
        options: AuthorizeOptions,
    ) -> AuthorizationDecision {
        self.guarded(&options, self.evaluate(session, &options)).await
    }

    /// Local check against the caller's resolved context.
    ///
    /// This is a UX shortcut for hiding controls the caller cannot use. It
    /// never consults the authoritative check and must not guard an
    /// operation; use [`Authorizer::authorize`] for that. Any failure
    /// answers `false`.
    pub async fn has_permission(
        &self,
        resource: impl Into<ResourceId>,
        action: impl Into<ActionId>,
    ) -> bool {
        let Ok(Some(session)) = self.sessions.current_session().await else {
            return false;
        };
        match self.resolve_context(&session).await {
            Ok(context) => {
                hierarchy::is_admin(&context) || context.allows(&resource.into(), &action.into())
            }
            Err(_) => false,
        }
    }

    /// Returns the caller's context, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::ContextUnavailable` if the store cannot resolve
    /// the user's roles or permissions.
    pub async fn resolve_context(&self, session: &Session) -> AuthzResult<AuthorizationContext> {
        let user_id = session.user_id;
        let mut context = self
            .cache
            .get_or_load(user_id, || self.load_context(user_id))
            .await?;
        context.attach_session(session);
        Ok(context)
    }

    /// Drops one user's cached context.
    pub async fn invalidate_user(&self, user_id: UserId) {
        self.cache.invalidate(user_id).await;
    }

    /// Drops every cached context.
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all().await;
    }

    // -------------------------------------------------------------------------
    // Pipeline
    // -------------------------------------------------------------------------

    async fn evaluate(
        &self,
        session: Option<&Session>,
        options: &AuthorizeOptions,
    ) -> AuthorizationDecision {
        // Step 1: authentication
        let Some(session) = session else {
            return self
                .deny(DenialReason::Unauthenticated, options, None, None)
                .await;
        };
        let user_id = session.user_id;

        // Step 2: context resolution
        let context = match self.resolve_context(session).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to resolve authorization context");
                return self
                    .deny(DenialReason::ContextUnavailable, options, Some(user_id), None)
                    .await;
            }
        };

        // Step 3: admin bypass
        let bypass = options
            .bypass_for_admin
            .unwrap_or(self.defaults.bypass_for_admin);
        if bypass && hierarchy::is_admin(&context) {
            tracing::debug!(
                user_id = %user_id,
                role = %context.user_role,
                resource = %options.resource,
                action = %options.action,
                "Admin bypass"
            );
            return self.grant(context, DecisionMethod::AdminBypass, options).await;
        }

        // Step 4: rate limit
        let enforced = options.rate_limit.filter(|limit| limit.enabled);
        if let Some(limit) = enforced {
            match self
                .rate_limiter
                .check(
                    user_id,
                    context.ip_address,
                    &options.action,
                    &options.resource,
                    limit,
                )
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    return self
                        .deny(DenialReason::RateLimitExceeded, options, Some(user_id), Some(context))
                        .await;
                }
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Rate limit check failed");
                    return self
                        .deny(DenialReason::SystemError, options, Some(user_id), Some(context))
                        .await;
                }
            }
        }

        // Step 5: authoritative check, re-enforcing the same budget server-side.
        let budget = enforced.unwrap_or_else(|| self.rate_limiter.profile(RateLimitProfile::General));
        let check = OperationCheck {
            resource: options.resource.clone(),
            action: options.action.clone(),
            user_id,
            rate_limit_check: enforced.is_some(),
            max_requests: budget.max_requests,
            window_minutes: budget.window_minutes,
        };
        match self.store.authorize_operation(&check).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(
                    user_id = %user_id,
                    resource = %options.resource,
                    action = %options.action,
                    "Authoritative check rejected operation"
                );
                return self
                    .deny(
                        DenialReason::InsufficientPermissions,
                        options,
                        Some(user_id),
                        Some(context),
                    )
                    .await;
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Authoritative check failed");
                return self
                    .deny(DenialReason::from(&e), options, Some(user_id), Some(context))
                    .await;
            }
        }

        // Step 6: grant
        self.grant(context, DecisionMethod::RbacCheck, options).await
    }

    async fn load_context(&self, user_id: UserId) -> AuthzResult<AuthorizationContext> {
        let roles = self
            .store
            .get_user_roles(user_id)
            .await
            .map_err(|e| AuthzError::context_unavailable(e.to_string()))?;
        let permissions = self
            .store
            .get_user_permissions(user_id)
            .await
            .map_err(|e| AuthzError::context_unavailable(e.to_string()))?;

        let active: Vec<_> = roles.into_iter().filter(|role| role.is_active).collect();
        let user_role = hierarchy::highest_role(&active)
            .map_or_else(|| DEFAULT_ROLE.to_string(), |role| role.name.clone());

        tracing::debug!(
            user_id = %user_id,
            role = %user_role,
            roles = active.len(),
            "Resolved authorization context"
        );

        Ok(AuthorizationContext {
            user_id,
            user_role,
            roles: active.into_iter().map(|role| role.name).collect(),
            permissions,
            ip_address: None,
            user_agent: None,
        })
    }

    async fn grant(
        &self,
        context: AuthorizationContext,
        method: DecisionMethod,
        options: &AuthorizeOptions,
    ) -> AuthorizationDecision {
        if self.should_log(options) {
            self.audit
                .log_authorized_access(
                    &options.resource,
                    &options.action,
                    &context,
                    method,
                    options.resource_id.clone(),
                )
                .await;
        }
        AuthorizationDecision::granted(context, method)
    }

    async fn deny(
        &self,
        reason: DenialReason,
        options: &AuthorizeOptions,
        user_id: Option<UserId>,
        context: Option<AuthorizationContext>,
    ) -> AuthorizationDecision {
        if self.should_log(options) {
            self.audit
                .log_unauthorized_attempt(
                    reason,
                    &options.resource,
                    &options.action,
                    user_id,
                    options.resource_id.clone(),
                    context.as_ref(),
                )
                .await;
        }
        AuthorizationDecision::denied(reason, context)
    }

    fn should_log(&self, options: &AuthorizeOptions) -> bool {
        options.log_attempt.unwrap_or(self.defaults.log_attempt)
    }

    /// Turns a panic anywhere in `pipeline` into a `system_error` denial.
    async fn guarded<F>(&self, options: &AuthorizeOptions, pipeline: F) -> AuthorizationDecision
    where
        F: Future<Output = AuthorizationDecision>,
    {
        match AssertUnwindSafe(pipeline).catch_unwind().await {
            Ok(decision) => decision,
            Err(_) => {
                tracing::error!(
                    resource = %options.resource,
                    action = %options.action,
                    "Authorization pipeline panicked"
                );
                self.deny(DenialReason::SystemError, options, None, None)
                    .await
            }
        }
    }
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("cache", &self.cache)
            .field("rate_limiter", &self.rate_limiter)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}
