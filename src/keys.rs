//! Key assignment lifecycle and inventory
//!
//! Assignment rules live here as a domain service over [`Credential`] values;
//! the repository only persists. Assign and revoke commit the credential and
//! the ledger entry as one atomic, version-checked unit, so concurrent
//! attempts on the same key serialize: exactly one writer wins, the loser
//! observes the key in its new state.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use crate::access::AuthenticatedCaller;
use crate::audit::{emit, AuditAction, AuditRecord, AuditSink};
use crate::error::Error;
use crate::models::{Assignment, AssignmentStatus, Credential, KeyFilter, KeyStatus};
use crate::storage::KeyRepository;

/// A credential together with its assignment context
#[derive(Debug, Clone)]
pub struct KeyDetails {
    pub credential: Credential,
    pub current_assignment: Option<Assignment>,
    /// Full assignment history, newest first
    pub history: Vec<Assignment>,
}

/// Inventory snapshot across all registered keys
#[derive(Debug, Clone)]
pub struct InventoryReport {
    pub total: usize,
    pub available: usize,
    pub assigned: usize,
    pub generated_at: chrono::DateTime<Utc>,
}

/// Domain service for key assignment and inventory operations
#[derive(Clone)]
pub struct KeyService {
    keys: Arc<dyn KeyRepository>,
    audit: Arc<dyn AuditSink>,
}

impl KeyService {
    #[must_use]
    pub fn new(keys: Arc<dyn KeyRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self { keys, audit }
    }

    /// Assign an available key to a user.
    ///
    /// # Errors
    ///
    /// - [`Error::CredentialNotFound`] — no such key
    /// - [`Error::KeyNotAvailable`] — the key is already assigned, or a
    ///   racing assign won the commit
    pub async fn assign_key(
        &self,
        key_id: &str,
        user_ref: &str,
        assigned_by: &str,
    ) -> Result<Assignment, Error> {
        let credential = self
            .keys
            .credential(key_id)
            .await?
            .ok_or(Error::CredentialNotFound)?;

        if !credential.is_available_for_assignment() {
            return Err(Error::KeyNotAvailable);
        }

        let assignment = Assignment::new(&credential.id, user_ref, assigned_by);
        let mut updated = credential;
        updated.status = KeyStatus::Assigned;
        updated.current_assignment_id = Some(assignment.id.clone());

        let (_, assignment) = self
            .keys
            .commit_assignment(updated, assignment)
            .await
            .map_err(|err| match err {
                // A racing writer changed the credential first
                Error::Conflict { .. } => Error::KeyNotAvailable,
                other => other,
            })?;

        log::info!(
            "key {key_id} assigned to user {user_ref} by {assigned_by} (assignment {})",
            assignment.id
        );
        emit(
            self.audit.as_ref(),
            AuditRecord::new(
                AuditAction::KeyAssigned,
                assigned_by,
                &assignment.id,
                json!({
                    "keyId": assignment.key_ref,
                    "userId": assignment.user_ref,
                }),
            ),
        )
        .await;

        Ok(assignment)
    }

    /// Assign on behalf of an authenticated admin caller
    ///
    /// # Errors
    ///
    /// See [`KeyService::assign_key`].
    pub async fn assign_key_for(
        &self,
        key_id: &str,
        user_ref: &str,
        caller: &AuthenticatedCaller,
    ) -> Result<Assignment, Error> {
        self.assign_key(key_id, user_ref, &caller.id).await
    }

    /// Revoke a key's active assignment, returning it to the Available pool.
    ///
    /// Revoking a key with no active assignment fails without mutating
    /// anything.
    ///
    /// # Errors
    ///
    /// - [`Error::CredentialNotFound`] — no such key
    /// - [`Error::KeyNotAssigned`] — nothing to revoke, or a racing revoke
    ///   already released the key
    pub async fn revoke_key(
        &self,
        key_id: &str,
        revoked_by: &str,
    ) -> Result<Assignment, Error> {
        let credential = self
            .keys
            .credential(key_id)
            .await?
            .ok_or(Error::CredentialNotFound)?;

        let assignment_id = credential
            .current_assignment_id
            .clone()
            .ok_or(Error::KeyNotAssigned)?;
        let assignment = self
            .keys
            .assignment(&assignment_id)
            .await?
            .ok_or_else(|| Error::Unavailable("active assignment record missing".into()))?;

        let now = Utc::now();
        let mut revoked = assignment;
        revoked.status = AssignmentStatus::Revoked;
        revoked.revoked_at = Some(now);
        revoked.revoked_by = Some(revoked_by.to_string());

        let mut updated = credential;
        updated.status = KeyStatus::Available;
        updated.current_assignment_id = None;
        updated.user_handle = None;
        updated.revoked_at = Some(now);
        updated.revoked_by = Some(revoked_by.to_string());

        let (_, revoked) = self
            .keys
            .commit_revocation(updated, revoked)
            .await
            .map_err(|err| match err {
                Error::Conflict { .. } => Error::KeyNotAssigned,
                other => other,
            })?;

        log::info!(
            "key {key_id} revoked by {revoked_by} (assignment {})",
            revoked.id
        );
        emit(
            self.audit.as_ref(),
            AuditRecord::new(
                AuditAction::KeyRevoked,
                revoked_by,
                &revoked.id,
                json!({
                    "keyId": revoked.key_ref,
                    "userId": revoked.user_ref,
                }),
            ),
        )
        .await;

        Ok(revoked)
    }

    /// Revoke on behalf of an authenticated admin caller
    ///
    /// # Errors
    ///
    /// See [`KeyService::revoke_key`].
    pub async fn revoke_key_for(
        &self,
        key_id: &str,
        caller: &AuthenticatedCaller,
    ) -> Result<Assignment, Error> {
        self.revoke_key(key_id, &caller.id).await
    }

    /// A key with its current assignment and full history
    ///
    /// # Errors
    ///
    /// Returns [`Error::CredentialNotFound`] for an unknown key.
    pub async fn key_details(&self, key_id: &str) -> Result<KeyDetails, Error> {
        let credential = self
            .keys
            .credential(key_id)
            .await?
            .ok_or(Error::CredentialNotFound)?;
        let current_assignment = match &credential.current_assignment_id {
            Some(id) => self.keys.assignment(id).await?,
            None => None,
        };
        let history = self.keys.assignments_for_key(&credential.id).await?;
        Ok(KeyDetails {
            credential,
            current_assignment,
            history,
        })
    }

    /// Keys matching `filter`, newest first
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the store cannot be reached.
    pub async fn search_keys(&self, filter: &KeyFilter) -> Result<Vec<Credential>, Error> {
        self.keys.search(filter).await
    }

    /// Count of keys matching `filter`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the store cannot be reached.
    pub async fn count_keys(&self, filter: &KeyFilter) -> Result<usize, Error> {
        self.keys.count(filter).await
    }

    /// Inventory counts by status
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the store cannot be reached.
    pub async fn inventory_report(&self) -> Result<InventoryReport, Error> {
        let total = self.keys.count(&KeyFilter::default()).await?;
        let available = self
            .keys
            .count(&KeyFilter {
                status: Some(KeyStatus::Available),
                ..KeyFilter::default()
            })
            .await?;
        let assigned = self
            .keys
            .count(&KeyFilter {
                status: Some(KeyStatus::Assigned),
                ..KeyFilter::default()
            })
            .await?;
        Ok(InventoryReport {
            total,
            available,
            assigned,
            generated_at: Utc::now(),
        })
    }
}
