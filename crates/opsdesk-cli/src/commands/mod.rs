pub mod check;
pub mod permissions;
pub mod roles;

use std::sync::Arc;

use anyhow::{Context, Result};
use opsdesk_authz::config::AuditDispatch;
use opsdesk_authz::{AuditSink, Authorizer, AuthzConfig, Clock, Session, StaticSession, SystemClock};
use opsdesk_authz_memory::{Fixture, InMemoryRoleStore};

/// Store and configuration shared by every command.
pub struct Engine {
    pub store: Arc<InMemoryRoleStore>,
    pub config: AuthzConfig,
    pub clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn load(config: AuthzConfig, fixture: Option<&str>) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let fixture = match fixture {
            Some(path) => {
                Fixture::load(path).with_context(|| format!("loading fixture {path}"))?
            }
            None => Fixture::default(),
        };
        let store = fixture.into_store(clock.clone())?;
        Ok(Self {
            store: Arc::new(store),
            config,
            clock,
        })
    }

    /// An authorizer acting as `session`. Audit writes are awaited so nothing
    /// is lost when the process exits.
    pub fn authorizer(&self, session: Session, sink: Arc<dyn AuditSink>) -> Result<Authorizer> {
        let mut config = self.config.clone();
        config.audit.dispatch = AuditDispatch::Inline;
        let authorizer = Authorizer::builder(
            self.store.clone(),
            Arc::new(StaticSession::signed_in(session)),
        )
        .config(config)
        .clock(self.clock.clone())
        .audit_sink(sink)
        .build()?;
        Ok(authorizer)
    }
}
