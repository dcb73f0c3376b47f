//! Resolved authorization context and decision types.

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::assignment::UserId;
use super::permission::{ActionId, PermissionMap, ResourceId};
use crate::error::DenialReason;

// =============================================================================
// Session
// =============================================================================

/// The caller identity established by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Authenticated user.
    pub user_id: UserId,

    /// Client IP, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddr>,

    /// Client user agent, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Session {
    /// Creates a session with no client metadata.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            ip_address: None,
            user_agent: None,
        }
    }

    /// Sets the client IP.
    #[must_use]
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip_address = Some(ip);
        self
    }

    /// Sets the client user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

// =============================================================================
// Authorization Context
// =============================================================================

/// Everything the engine knows about a caller after context resolution.
///
/// Contexts are cached per user and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationContext {
    /// The user this context belongs to.
    pub user_id: UserId,

    /// Name of the highest-privilege active role.
    pub user_role: String,

    /// Names of every active role the user holds.
    pub roles: BTreeSet<String>,

    /// Union of the permission maps of every active role.
    pub permissions: PermissionMap,

    /// Client IP of the session that resolved this context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddr>,

    /// Client user agent of the session that resolved this context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl AuthorizationContext {
    /// Returns `true` if the merged permissions grant `action` on `resource`.
    #[must_use]
    pub fn allows(&self, resource: &ResourceId, action: &ActionId) -> bool {
        self.permissions.allows(resource, action)
    }

    /// Returns `true` if the user holds the named role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Copies client metadata from `session`.
    pub fn attach_session(&mut self, session: &Session) {
        self.ip_address = session.ip_address;
        self.user_agent = session.user_agent.clone();
    }
}

// =============================================================================
// Decision
// =============================================================================

/// How a grant was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMethod {
    /// Granted because the caller holds an admin role.
    AdminBypass,
    /// Granted by the authoritative role-based check.
    RbacCheck,
}

impl DecisionMethod {
    /// Returns the method tag recorded in audit events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdminBypass => "admin_bypass",
            Self::RbacCheck => "rbac_check",
        }
    }
}

impl fmt::Display for DecisionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict returned by the decision pipeline.
///
/// Callers act on it immediately; only the derived audit events are durable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorizationDecision {
    /// Whether the operation may proceed.
    pub authorized: bool,

    /// Denial cause, present when `authorized` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,

    /// Resolved context, when resolution got that far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<AuthorizationContext>,

    /// How the grant was reached, present when `authorized` is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<DecisionMethod>,
}

impl AuthorizationDecision {
    /// A grant reached by `method`.
    #[must_use]
    pub fn granted(context: AuthorizationContext, method: DecisionMethod) -> Self {
        Self {
            authorized: true,
            reason: None,
            context: Some(context),
            method: Some(method),
        }
    }

    /// A denial with an optional context.
    #[must_use]
    pub fn denied(reason: DenialReason, context: Option<AuthorizationContext>) -> Self {
        Self {
            authorized: false,
            reason: Some(reason),
            context,
            method: None,
        }
    }

    /// Returns the user-facing denial text, if denied.
    #[must_use]
    pub fn reason_text(&self) -> Option<&'static str> {
        self.reason.as_ref().map(DenialReason::message)
    }
}
