//! Security key credential records
//!
//! One `Credential` exists per physical key. The record couples the WebAuthn
//! credential material captured at registration with the assignment state
//! machine: `status == Assigned` exactly when `current_assignment_id` is set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Assignment state of a physical key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Available,
    Assigned,
}

/// Durable record of a registered security key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Record id (UUID)
    pub id: String,
    /// Human-readable unique label, immutable after creation
    pub serial_number: String,
    /// Base64url-encoded WebAuthn credential id, unique across all keys
    pub credential_id: String,
    /// COSE-encoded public key captured at registration, never mutated
    pub public_key: Vec<u8>,
    /// Authenticator model id, normalized to lowercase hex
    pub aaguid: Option<String>,
    pub status: KeyStatus,
    /// Signature counter reported by the authenticator on each use
    pub sign_count: u32,
    /// Id of the active assignment, present exactly when status is Assigned
    pub current_assignment_id: Option<String>,
    /// Base64url user handle derived from the raw credential id; cleared on
    /// revocation
    pub user_handle: Option<String>,
    pub device_name: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
    /// Optimistic concurrency version, bumped by the repository on every write
    pub version: u64,
}

impl Credential {
    /// Whether the key can accept a new assignment
    #[must_use]
    pub fn is_available_for_assignment(&self) -> bool {
        self.status == KeyStatus::Available && self.current_assignment_id.is_none()
    }

    /// The status/assignment-link invariant: `Assigned` exactly when an
    /// assignment id is present
    #[must_use]
    pub fn assignment_link_consistent(&self) -> bool {
        (self.status == KeyStatus::Assigned) == self.current_assignment_id.is_some()
    }
}

/// Inventory query filter
#[derive(Debug, Clone, Default)]
pub struct KeyFilter {
    pub status: Option<KeyStatus>,
    /// Case-insensitive substring match on serial number or device name
    pub search: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl KeyFilter {
    /// Whether `credential` satisfies every populated clause
    #[must_use]
    pub fn matches(&self, credential: &Credential) -> bool {
        if let Some(status) = self.status {
            if credential.status != status {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let serial_hit = credential.serial_number.to_lowercase().contains(&needle);
            let name_hit = credential
                .device_name
                .as_ref()
                .is_some_and(|name| name.to_lowercase().contains(&needle));
            if !serial_hit && !name_hit {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if credential.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if credential.created_at > before {
                return false;
            }
        }
        true
    }
}
