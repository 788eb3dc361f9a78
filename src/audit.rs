//! Audit event emission
//!
//! Every security-relevant state transition produces an [`AuditRecord`].
//! Emission is fire-and-forget: a sink failure is logged and reported but
//! never reverts the state change that triggered it — audit is telemetry,
//! not part of the consistency invariant.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Security-relevant actions recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "KEY_REGISTERED")]
    KeyRegistered,
    #[serde(rename = "KEY_ASSIGNED")]
    KeyAssigned,
    #[serde(rename = "KEY_REVOKED")]
    KeyRevoked,
    #[serde(rename = "KEY_AUTHENTICATED")]
    KeyAuthenticated,
}

impl AuditAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::KeyRegistered => "KEY_REGISTERED",
            AuditAction::KeyAssigned => "KEY_ASSIGNED",
            AuditAction::KeyRevoked => "KEY_REVOKED",
            AuditAction::KeyAuthenticated => "KEY_AUTHENTICATED",
        }
    }
}

/// One audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: AuditAction,
    /// Caller or user that performed the transition
    pub performed_by: String,
    /// Id of the credential or assignment the action touched
    pub resource_id: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    #[must_use]
    pub fn new(
        action: AuditAction,
        performed_by: &str,
        resource_id: &str,
        details: serde_json::Value,
    ) -> Self {
        Self {
            action,
            performed_by: performed_by.to_string(),
            resource_id: resource_id.to_string(),
            details,
            timestamp: Utc::now(),
        }
    }
}

/// Destination for audit records; storage and export formats live outside
/// this crate
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one audit entry
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot accept the record. Callers treat
    /// this as best-effort; see [`emit`].
    async fn record(&self, record: AuditRecord) -> Result<(), Error>;
}

/// Emit a record without letting sink failures propagate.
///
/// The discrepancy between committed state and the missing audit entry is
/// reported through the log so operators can reconcile.
pub async fn emit(sink: &dyn AuditSink, record: AuditRecord) {
    let action = record.action;
    let resource = record.resource_id.clone();
    if let Err(err) = sink.record(record).await {
        log::error!(
            "audit sink rejected {} for resource {resource}: {err}; state change was committed without an audit entry",
            action.as_str()
        );
    }
}

/// Sink that writes records to the process log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), Error> {
        log::info!(
            target: "vaultkey::audit",
            "{} performed_by={} resource={} details={}",
            record.action.as_str(),
            record.performed_by,
            record.resource_id,
            record.details
        );
        Ok(())
    }
}
