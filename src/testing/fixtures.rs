//! Pre-wired test harness

use std::sync::Arc;
use std::time::Duration;

use crate::ceremony::types::RegisteringUser;
use crate::ceremony::CeremonyEngine;
use crate::keys::KeyService;
use crate::settings::VaultkeySettings;
use crate::storage::memory::{MemoryChallengeStore, MemoryKeyRepository};
use crate::testing::constants::{TEST_EMAIL, TEST_USER};
use crate::testing::mock::MemoryAuditSink;

/// Engine, key service and stores wired against in-memory backends with a
/// capturing audit sink
pub struct TestHarness {
    pub settings: VaultkeySettings,
    pub challenges: Arc<MemoryChallengeStore>,
    pub repository: Arc<MemoryKeyRepository>,
    pub audit: Arc<MemoryAuditSink>,
    pub engine: CeremonyEngine,
    pub keys: KeyService,
}

impl TestHarness {
    /// Harness with default settings (localhost relying party, 300 s TTL)
    ///
    /// # Panics
    ///
    /// Panics if the default settings are rejected; test-only code.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(VaultkeySettings::default())
    }

    /// Harness over explicit settings, e.g. a zero challenge TTL
    ///
    /// # Panics
    ///
    /// Panics if the settings are rejected; test-only code.
    #[must_use]
    pub fn with_settings(settings: VaultkeySettings) -> Self {
        let challenges = Arc::new(MemoryChallengeStore::new(Duration::from_secs(
            settings.challenge.ttl_seconds,
        )));
        let repository = Arc::new(MemoryKeyRepository::new());
        let audit = Arc::new(MemoryAuditSink::new());

        let engine = CeremonyEngine::new(
            &settings,
            challenges.clone(),
            repository.clone(),
            audit.clone(),
        )
        .expect("test settings accepted");
        let keys = KeyService::new(repository.clone(), audit.clone());

        Self {
            settings,
            challenges,
            repository,
            audit,
            engine,
            keys,
        }
    }

    /// The relying party id the harness engine was built with
    #[must_use]
    pub fn rp_id(&self) -> &str {
        &self.settings.relying_party.id
    }

    /// The origin the harness engine expects in client data
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.settings.relying_party.origin
    }

    /// The default registering user
    #[must_use]
    pub fn default_user() -> RegisteringUser {
        RegisteringUser {
            id: TEST_USER.to_string(),
            name: TEST_EMAIL.to_string(),
            display_name: "User One".to_string(),
        }
    }

    /// A registering user with the given reference
    #[must_use]
    pub fn user(id: &str) -> RegisteringUser {
        RegisteringUser {
            id: id.to_string(),
            name: format!("{id}@example.com"),
            display_name: id.to_string(),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
