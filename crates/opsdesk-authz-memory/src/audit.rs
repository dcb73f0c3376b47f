//! In-memory audit sink.

use async_trait::async_trait;
use opsdesk_authz::{AuditEvent, AuditSink, AuthzResult};
use tokio::sync::RwLock;

/// Keeps every recorded event in memory for inspection.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events, oldest first.
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }

    /// Denial events only.
    pub async fn denials(&self) -> Vec<AuditEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.is_denial())
            .cloned()
            .collect()
    }

    /// Event names in recording order.
    pub async fn event_types(&self) -> Vec<&'static str> {
        self.events
            .read()
            .await
            .iter()
            .map(|e| e.event_type.as_str())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, event: &AuditEvent) -> AuthzResult<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}
