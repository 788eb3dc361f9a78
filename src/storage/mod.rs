//! Repository interfaces over the backing store
//!
//! Persistence engine internals stay out of the core: ceremony and
//! assignment logic operate on these traits only. The in-memory
//! implementations in [`memory`] back the test suite and single-process
//! deployments; a document store implements the same contracts, with the
//! `commit_*` operations mapping to transactions.

pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::models::{Assignment, CeremonyType, Challenge, Credential, KeyFilter};

/// Store for short-lived ceremony challenges.
///
/// One live challenge per (user, ceremony type): issuing replaces any
/// previous value, making the newest challenge the only one that verifies.
/// Implementations must never return a challenge older than the configured
/// TTL, swept or not.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Generate and persist a fresh challenge, replacing any live one for
    /// the same (user, ceremony) pair
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the store cannot be reached.
    async fn issue(&self, user_ref: &str, ceremony: CeremonyType) -> Result<Challenge, Error>;

    /// Fetch the live challenge without deleting it; callers delete
    /// explicitly after successful verification
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the store cannot be reached.
    async fn lookup(
        &self,
        user_ref: &str,
        ceremony: CeremonyType,
    ) -> Result<Option<Challenge>, Error>;

    /// Remove the live challenge for the pair, if any
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the store cannot be reached.
    async fn delete(&self, user_ref: &str, ceremony: CeremonyType) -> Result<(), Error>;

    /// Remove every challenge older than the TTL; idempotent and safe to
    /// call concurrently. Returns the number of challenges removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the store cannot be reached.
    async fn expire(&self) -> Result<usize, Error>;
}

/// Repository over credential records and the assignment ledger.
///
/// Credentials carry an optimistic-concurrency `version`; every write
/// checks it and bumps it, so racing writers serialize per credential. The
/// `commit_*` operations persist a credential and an assignment as one
/// atomic unit — no observer may see `status = Assigned` without a
/// resolvable assignment, or an Active assignment for an Available key.
#[async_trait]
pub trait KeyRepository: Send + Sync {
    /// Insert a freshly registered credential
    ///
    /// # Errors
    ///
    /// Returns a retryable [`Error::Conflict`] when the generated serial
    /// number collides, a non-retryable one when the WebAuthn credential id
    /// is already registered.
    async fn insert_credential(&self, credential: Credential) -> Result<Credential, Error>;

    /// Fetch a credential by record id
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the store cannot be reached.
    async fn credential(&self, id: &str) -> Result<Option<Credential>, Error>;

    /// Fetch a credential by its WebAuthn credential id
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the store cannot be reached.
    async fn credential_by_credential_id(
        &self,
        credential_id: &str,
    ) -> Result<Option<Credential>, Error>;

    /// Credentials matching `filter`, newest first
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the store cannot be reached.
    async fn search(&self, filter: &KeyFilter) -> Result<Vec<Credential>, Error>;

    /// Count of credentials matching `filter`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the store cannot be reached.
    async fn count(&self, filter: &KeyFilter) -> Result<usize, Error>;

    /// Version-checked update of a single credential (counter, last-used).
    /// The stored version must equal `credential.version`; on success the
    /// stored record carries `version + 1`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] when the version check fails.
    async fn update_credential(&self, credential: Credential) -> Result<Credential, Error>;

    /// Fetch an assignment by id
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the store cannot be reached.
    async fn assignment(&self, id: &str) -> Result<Option<Assignment>, Error>;

    /// Active assignments belonging to a user
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the store cannot be reached.
    async fn active_assignments_for_user(
        &self,
        user_ref: &str,
    ) -> Result<Vec<Assignment>, Error>;

    /// Full assignment history for a key, newest first
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the store cannot be reached.
    async fn assignments_for_key(&self, key_ref: &str) -> Result<Vec<Assignment>, Error>;

    /// Atomically persist an assignment together with the credential that
    /// now references it
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] when the credential version check fails
    /// (a racing writer won).
    async fn commit_assignment(
        &self,
        credential: Credential,
        assignment: Assignment,
    ) -> Result<(Credential, Assignment), Error>;

    /// Atomically persist a revoked assignment together with the credential
    /// released by it
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] when the credential version check fails.
    async fn commit_revocation(
        &self,
        credential: Credential,
        assignment: Assignment,
    ) -> Result<(Credential, Assignment), Error>;
}

/// Run [`ChallengeStore::expire`] on a fixed interval until the returned
/// task is aborted.
///
/// The sweep is an optimization: liveness is re-checked against the TTL at
/// use time, so a missed or delayed sweep never extends a challenge's life.
pub fn spawn_expiry_sweep(
    store: Arc<dyn ChallengeStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.expire().await {
                Ok(0) => {}
                Ok(removed) => log::debug!("challenge sweep removed {removed} expired entries"),
                Err(err) => log::warn!("challenge sweep failed: {err}"),
            }
        }
    })
}
