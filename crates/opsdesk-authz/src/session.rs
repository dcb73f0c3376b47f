//! Caller identity resolution.

use async_trait::async_trait;

use crate::AuthzResult;
use crate::types::Session;

/// Resolves the session of the current caller.
///
/// Returning `Ok(None)` means "nobody is signed in"; returning an error means
/// the session layer itself failed. The engine denies in both cases.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Returns the active session, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the session backend cannot be reached.
    async fn current_session(&self) -> AuthzResult<Option<Session>>;
}

/// A provider that always returns the same session (or none).
///
/// Useful for background jobs that act as a fixed identity and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSession(Option<Session>);

impl StaticSession {
    /// A provider signed in as `session`.
    #[must_use]
    pub fn signed_in(session: Session) -> Self {
        Self(Some(session))
    }

    /// A provider with nobody signed in.
    #[must_use]
    pub fn anonymous() -> Self {
        Self(None)
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn current_session(&self) -> AuthzResult<Option<Session>> {
        Ok(self.0.clone())
    }
}
