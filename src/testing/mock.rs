//! Mock audit sinks

use async_trait::async_trait;
use std::sync::Mutex;

use crate::audit::{AuditAction, AuditRecord, AuditSink};
use crate::error::Error;

/// Audit sink that captures records for assertions
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record received so far
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Actions in emission order
    #[must_use]
    pub fn actions(&self) -> Vec<AuditAction> {
        self.records()
            .into_iter()
            .map(|record| record.action)
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), Error> {
        self.records
            .lock()
            .map_err(|_| Error::Unavailable("audit sink lock poisoned".into()))?
            .push(record);
        Ok(())
    }
}

/// Audit sink that always fails; exercises the fire-and-forget contract
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn record(&self, _record: AuditRecord) -> Result<(), Error> {
        Err(Error::Unavailable("audit sink offline".into()))
    }
}
