//! In-memory store implementations
//!
//! Challenges are temporary and never need durable persistence; credentials
//! and assignments are held here for tests and single-process deployments.
//! Both stores take a plain lock around a short critical section — the lock
//! is what makes the combined credential+assignment commits atomic.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use super::{ChallengeStore, KeyRepository};
use crate::error::Error;
use crate::models::{
    Assignment, CeremonyType, Challenge, Credential, KeyFilter,
};
use crate::utils::crypto::generate_challenge;

/// In-memory [`ChallengeStore`] with replace-on-issue semantics
pub struct MemoryChallengeStore {
    ttl: chrono::Duration,
    entries: Mutex<HashMap<(String, CeremonyType), Challenge>>,
}

impl MemoryChallengeStore {
    /// Create a store enforcing the given TTL at every read
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<(String, CeremonyType), Challenge>>, Error> {
        self.entries
            .lock()
            .map_err(|_| Error::Unavailable("challenge store lock poisoned".into()))
    }

    /// Number of live entries; test instrumentation
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|map| map.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn issue(&self, user_ref: &str, ceremony: CeremonyType) -> Result<Challenge, Error> {
        let challenge = Challenge::new(user_ref, ceremony, generate_challenge());
        let mut entries = self.lock()?;
        entries.insert((user_ref.to_string(), ceremony), challenge.clone());
        Ok(challenge)
    }

    async fn lookup(
        &self,
        user_ref: &str,
        ceremony: CeremonyType,
    ) -> Result<Option<Challenge>, Error> {
        let entries = self.lock()?;
        let challenge = entries.get(&(user_ref.to_string(), ceremony));
        // Lazy TTL enforcement: stale entries are invisible even before a sweep
        Ok(challenge
            .filter(|challenge| !challenge.is_expired(self.ttl))
            .cloned())
    }

    async fn delete(&self, user_ref: &str, ceremony: CeremonyType) -> Result<(), Error> {
        let mut entries = self.lock()?;
        entries.remove(&(user_ref.to_string(), ceremony));
        Ok(())
    }

    async fn expire(&self) -> Result<usize, Error> {
        let mut entries = self.lock()?;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, challenge| !challenge.is_expired(ttl));
        Ok(before - entries.len())
    }
}

impl std::fmt::Debug for MemoryChallengeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChallengeStore")
            .field("entries", &self.len())
            .finish()
    }
}

#[derive(Default)]
struct KeyTables {
    credentials: HashMap<String, Credential>,
    serial_index: HashMap<String, String>,
    credential_id_index: HashMap<String, String>,
    assignments: HashMap<String, Assignment>,
}

impl KeyTables {
    /// Version-checked credential write; bumps the version on success
    fn put_credential_checked(&mut self, mut credential: Credential) -> Result<Credential, Error> {
        match self.credentials.get(&credential.id) {
            Some(stored) if stored.version != credential.version => {
                return Err(Error::duplicate(format!(
                    "credential {} version {} is stale",
                    credential.id, credential.version
                )));
            }
            Some(_) => {}
            None => return Err(Error::NotFound("credential")),
        }
        credential.version += 1;
        self.credentials
            .insert(credential.id.clone(), credential.clone());
        Ok(credential)
    }
}

/// In-memory [`KeyRepository`]
#[derive(Default)]
pub struct MemoryKeyRepository {
    tables: RwLock<KeyTables>,
}

impl MemoryKeyRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, KeyTables>, Error> {
        self.tables
            .read()
            .map_err(|_| Error::Unavailable("key repository lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, KeyTables>, Error> {
        self.tables
            .write()
            .map_err(|_| Error::Unavailable("key repository lock poisoned".into()))
    }
}

#[async_trait]
impl KeyRepository for MemoryKeyRepository {
    async fn insert_credential(&self, credential: Credential) -> Result<Credential, Error> {
        let mut tables = self.write()?;
        if tables.serial_index.contains_key(&credential.serial_number) {
            // Generated serial collided; the caller may retry registration
            return Err(Error::retryable_conflict(format!(
                "serial number {} already exists",
                credential.serial_number
            )));
        }
        if tables
            .credential_id_index
            .contains_key(&credential.credential_id)
        {
            return Err(Error::duplicate("credential id already registered"));
        }
        tables
            .serial_index
            .insert(credential.serial_number.clone(), credential.id.clone());
        tables
            .credential_id_index
            .insert(credential.credential_id.clone(), credential.id.clone());
        tables
            .credentials
            .insert(credential.id.clone(), credential.clone());
        Ok(credential)
    }

    async fn credential(&self, id: &str) -> Result<Option<Credential>, Error> {
        Ok(self.read()?.credentials.get(id).cloned())
    }

    async fn credential_by_credential_id(
        &self,
        credential_id: &str,
    ) -> Result<Option<Credential>, Error> {
        let tables = self.read()?;
        Ok(tables
            .credential_id_index
            .get(credential_id)
            .and_then(|id| tables.credentials.get(id))
            .cloned())
    }

    async fn search(&self, filter: &KeyFilter) -> Result<Vec<Credential>, Error> {
        let tables = self.read()?;
        let mut hits: Vec<Credential> = tables
            .credentials
            .values()
            .filter(|credential| filter.matches(credential))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(hits)
    }

    async fn count(&self, filter: &KeyFilter) -> Result<usize, Error> {
        let tables = self.read()?;
        Ok(tables
            .credentials
            .values()
            .filter(|credential| filter.matches(credential))
            .count())
    }

    async fn update_credential(&self, credential: Credential) -> Result<Credential, Error> {
        self.write()?.put_credential_checked(credential)
    }

    async fn assignment(&self, id: &str) -> Result<Option<Assignment>, Error> {
        Ok(self.read()?.assignments.get(id).cloned())
    }

    async fn active_assignments_for_user(
        &self,
        user_ref: &str,
    ) -> Result<Vec<Assignment>, Error> {
        let tables = self.read()?;
        Ok(tables
            .assignments
            .values()
            .filter(|assignment| assignment.is_active() && assignment.user_ref == user_ref)
            .cloned()
            .collect())
    }

    async fn assignments_for_key(&self, key_ref: &str) -> Result<Vec<Assignment>, Error> {
        let tables = self.read()?;
        let mut history: Vec<Assignment> = tables
            .assignments
            .values()
            .filter(|assignment| assignment.key_ref == key_ref)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.assigned_at.cmp(&a.assigned_at));
        Ok(history)
    }

    async fn commit_assignment(
        &self,
        credential: Credential,
        assignment: Assignment,
    ) -> Result<(Credential, Assignment), Error> {
        let mut tables = self.write()?;
        let stored = tables.put_credential_checked(credential)?;
        tables
            .assignments
            .insert(assignment.id.clone(), assignment.clone());
        Ok((stored, assignment))
    }

    async fn commit_revocation(
        &self,
        credential: Credential,
        assignment: Assignment,
    ) -> Result<(Credential, Assignment), Error> {
        let mut tables = self.write()?;
        let stored = tables.put_credential_checked(credential)?;
        tables
            .assignments
            .insert(assignment.id.clone(), assignment.clone());
        Ok((stored, assignment))
    }
}

impl std::fmt::Debug for MemoryKeyRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (credentials, assignments) = self
            .tables
            .read()
            .map(|tables| (tables.credentials.len(), tables.assignments.len()))
            .unwrap_or((0, 0));
        f.debug_struct("MemoryKeyRepository")
            .field("credentials", &credentials)
            .field("assignments", &assignments)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KeyStatus;
    use chrono::Utc;

    fn credential(id: &str, serial: &str, credential_id: &str) -> Credential {
        Credential {
            id: id.into(),
            serial_number: serial.into(),
            credential_id: credential_id.into(),
            public_key: vec![0xa5],
            aaguid: None,
            status: KeyStatus::Available,
            sign_count: 0,
            current_assignment_id: None,
            user_handle: None,
            device_name: None,
            notes: None,
            created_at: Utc::now(),
            last_used: None,
            revoked_at: None,
            revoked_by: None,
            version: 0,
        }
    }

    #[tokio::test]
    async fn issue_replaces_live_challenge() {
        let store = MemoryChallengeStore::new(Duration::from_secs(300));
        let first = store
            .issue("user-1", CeremonyType::Registration)
            .await
            .unwrap();
        let second = store
            .issue("user-1", CeremonyType::Registration)
            .await
            .unwrap();
        assert_ne!(first.value, second.value);

        let live = store
            .lookup("user-1", CeremonyType::Registration)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(live.value, second.value);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn ceremony_types_do_not_collide() {
        let store = MemoryChallengeStore::new(Duration::from_secs(300));
        store
            .issue("user-1", CeremonyType::Registration)
            .await
            .unwrap();
        store
            .issue("user-1", CeremonyType::Authentication)
            .await
            .unwrap();
        assert_eq!(store.len(), 2);

        store
            .delete("user-1", CeremonyType::Registration)
            .await
            .unwrap();
        assert!(store
            .lookup("user-1", CeremonyType::Registration)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .lookup("user-1", CeremonyType::Authentication)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn expired_challenge_is_invisible_before_any_sweep() {
        let store = MemoryChallengeStore::new(Duration::from_secs(0));
        store
            .issue("user-1", CeremonyType::Authentication)
            .await
            .unwrap();
        // Entry still exists, but lookup refuses to serve it
        assert_eq!(store.len(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(store
            .lookup("user-1", CeremonyType::Authentication)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn expire_sweep_is_idempotent() {
        let store = MemoryChallengeStore::new(Duration::from_secs(0));
        store
            .issue("user-1", CeremonyType::Registration)
            .await
            .unwrap();
        store
            .issue("user-2", CeremonyType::Registration)
            .await
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.expire().await.unwrap(), 2);
        assert_eq!(store.expire().await.unwrap(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn background_sweep_removes_expired_entries() {
        use crate::storage::spawn_expiry_sweep;
        use std::sync::Arc;

        let store = Arc::new(MemoryChallengeStore::new(Duration::from_secs(0)));
        store
            .issue("user-1", CeremonyType::Registration)
            .await
            .unwrap();

        let handle = spawn_expiry_sweep(store.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty());
        handle.abort();
    }

    #[tokio::test]
    async fn duplicate_serial_is_retryable_conflict() {
        let repo = MemoryKeyRepository::new();
        repo.insert_credential(credential("key-1", "FT-AAAA", "cred-1"))
            .await
            .unwrap();
        let err = repo
            .insert_credential(credential("key-2", "FT-AAAA", "cred-2"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn duplicate_credential_id_is_hard_conflict() {
        let repo = MemoryKeyRepository::new();
        repo.insert_credential(credential("key-1", "FT-AAAA", "cred-1"))
            .await
            .unwrap();
        let err = repo
            .insert_credential(credential("key-2", "FT-BBBB", "cred-1"))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn stale_version_update_is_rejected() {
        let repo = MemoryKeyRepository::new();
        let stored = repo
            .insert_credential(credential("key-1", "FT-AAAA", "cred-1"))
            .await
            .unwrap();

        let mut fresh = stored.clone();
        fresh.sign_count = 5;
        let updated = repo.update_credential(fresh).await.unwrap();
        assert_eq!(updated.version, stored.version + 1);

        // A writer still holding the original version loses
        let mut stale = stored;
        stale.sign_count = 9;
        assert!(repo.update_credential(stale).await.is_err());
    }

    #[tokio::test]
    async fn search_orders_newest_first_and_counts() {
        let repo = MemoryKeyRepository::new();
        let mut older = credential("key-1", "FT-AAAA", "cred-1");
        older.created_at = Utc::now() - chrono::Duration::hours(2);
        repo.insert_credential(older).await.unwrap();
        repo.insert_credential(credential("key-2", "FT-BBBB", "cred-2"))
            .await
            .unwrap();

        let hits = repo.search(&KeyFilter::default()).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "key-2");
        assert_eq!(repo.count(&KeyFilter::default()).await.unwrap(), 2);
    }
}
