//! In-memory audit store for testing and development.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use super::{AuditFilter, AuditStore};
use crate::event::AuditEvent;
use turfguard_common::{Error, Result};

/// In-memory audit store.
///
/// All events are kept in memory and lost on drop. Cloning shares the
/// underlying log.
#[derive(Clone, Default)]
pub struct MemoryStore {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored event, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .read()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.read().map(|events| events.len()).unwrap_or(0)
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(&self, event: &AuditEvent) -> Result<()> {
        let mut events = self
            .events
            .write()
            .map_err(|_| Error::AuditWrite("Memory store lock poisoned".to_string()))?;
        events.push(event.clone());
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        let events = self
            .events
            .read()
            .map_err(|_| Error::AuditWrite("Memory store lock poisoned".to_string()))?;
        Ok(events.iter().filter(|e| filter.matches(e)).cloned().collect())
    }
}
