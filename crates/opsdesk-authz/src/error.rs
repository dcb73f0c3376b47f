//! Authorization error types.
//!
//! This module defines the error taxonomy of the authorization engine and the
//! denial reasons that the decision pipeline reports to callers.
//!
//! Errors never escape [`Authorizer::authorize`](crate::Authorizer::authorize):
//! the pipeline downgrades every failure into a [`DenialReason`]. Role
//! administration and store implementations return [`AuthzError`] directly.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur while resolving or administering authorization data.
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// There is no active session for the caller.
    #[error("Authentication required")]
    AuthenticationMissing,

    /// The store could not resolve the caller's role or permissions.
    #[error("Context unavailable: {message}")]
    ContextUnavailable {
        /// Description of why the context could not be resolved.
        message: String,
    },

    /// The caller exhausted the request budget for the operation.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// The caller lacks the permission required for the operation.
    #[error("Insufficient permissions: {message}")]
    InsufficientPermissions {
        /// Description of the missing permission.
        message: String,
    },

    /// The role/permission store failed or was unreachable.
    #[error("Store error: {message}")]
    Store {
        /// Description of the store error.
        message: String,
    },

    /// The requested role or assignment does not exist.
    #[error("Not found: {message}")]
    NotFound {
        /// Description of what was not found.
        message: String,
    },

    /// The mutation conflicts with existing data (duplicate role name, etc).
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// The administrative request is malformed (empty name, zero level).
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of the invalid value.
        message: String,
    },

    /// The mutation is not allowed (e.g. deleting a system role).
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of why the mutation is forbidden.
        message: String,
    },

    /// The authorization configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthzError {
    /// Creates a new `ContextUnavailable` error.
    #[must_use]
    pub fn context_unavailable(message: impl Into<String>) -> Self {
        Self::ContextUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `InsufficientPermissions` error.
    #[must_use]
    pub fn insufficient_permissions(message: impl Into<String>) -> Self {
        Self::InsufficientPermissions {
            message: message.into(),
        }
    }

    /// Creates a new `Store` error.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the error was caused by the caller (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationMissing
                | Self::RateLimitExceeded
                | Self::InsufficientPermissions { .. }
                | Self::NotFound { .. }
                | Self::Conflict { .. }
                | Self::InvalidInput { .. }
                | Self::Forbidden { .. }
        )
    }

    /// Returns `true` if the error is an infrastructure fault (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::ContextUnavailable { .. }
                | Self::Store { .. }
                | Self::Configuration { .. }
                | Self::Internal { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthenticationMissing => ErrorCategory::Authentication,
            Self::ContextUnavailable { .. } => ErrorCategory::Infrastructure,
            Self::RateLimitExceeded => ErrorCategory::RateLimit,
            Self::InsufficientPermissions { .. } => ErrorCategory::Authorization,
            Self::Store { .. } => ErrorCategory::Infrastructure,
            Self::NotFound { .. } => ErrorCategory::Validation,
            Self::Conflict { .. } => ErrorCategory::Validation,
            Self::InvalidInput { .. } => ErrorCategory::Validation,
            Self::Forbidden { .. } => ErrorCategory::Authorization,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of authorization errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Identity could not be established.
    Authentication,
    /// Permission checks failed.
    Authorization,
    /// Request budget exhausted.
    RateLimit,
    /// Invalid administrative request.
    Validation,
    /// Store or network failures.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

// =============================================================================
// Denial Reason
// =============================================================================

/// Why the decision pipeline denied a request.
///
/// The [`Display`](fmt::Display) text is the user-facing explanation that
/// console guards render; [`DenialReason::event_type`] is the audit event
/// name recorded for the denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// No active session.
    Unauthenticated,
    /// Role or permissions could not be resolved.
    ContextUnavailable,
    /// The rate-limit budget for the operation is exhausted.
    RateLimitExceeded,
    /// The authoritative check rejected the operation.
    InsufficientPermissions,
    /// The authoritative check itself failed.
    AuthorizationError,
    /// Any other failure inside the pipeline.
    SystemError,
}

impl DenialReason {
    /// Returns the user-facing explanation for the denial.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "Usuário não autenticado",
            Self::ContextUnavailable => "Contexto do usuário indisponível",
            Self::RateLimitExceeded => "Limite de requisições excedido",
            Self::InsufficientPermissions => "Permissões insuficientes",
            Self::AuthorizationError => "Erro na verificação de autorização",
            Self::SystemError => "Erro do sistema",
        }
    }

    /// Returns the audit event name recorded for this denial.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "authentication_required",
            Self::ContextUnavailable => "context_unavailable",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::InsufficientPermissions => "insufficient_permissions",
            Self::AuthorizationError => "authorization_error",
            Self::SystemError => "system_error",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl From<&AuthzError> for DenialReason {
    fn from(err: &AuthzError) -> Self {
        match err {
            AuthzError::AuthenticationMissing => Self::Unauthenticated,
            AuthzError::ContextUnavailable { .. } => Self::ContextUnavailable,
            AuthzError::RateLimitExceeded => Self::RateLimitExceeded,
            AuthzError::InsufficientPermissions { .. } | AuthzError::Forbidden { .. } => {
                Self::InsufficientPermissions
            }
            AuthzError::Store { .. } => Self::AuthorizationError,
            AuthzError::NotFound { .. }
            | AuthzError::Conflict { .. }
            | AuthzError::InvalidInput { .. }
            | AuthzError::Configuration { .. }
            | AuthzError::Internal { .. } => Self::SystemError,
        }
    }
}
