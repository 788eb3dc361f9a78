//! Assignment ledger entries
//!
//! The ledger is append-oriented: an entry is created Active by the assign
//! operation and transitions to Revoked exactly once. At most one Active
//! assignment may exist per key at any time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Active,
    Revoked,
}

/// One binding of a physical key to a user identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    /// Credential record id
    pub key_ref: String,
    /// User the key is bound to
    pub user_ref: String,
    /// Caller that performed the assignment
    pub assigned_by: String,
    pub assigned_at: DateTime<Utc>,
    pub status: AssignmentStatus,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
}

impl Assignment {
    /// Build a new Active assignment
    #[must_use]
    pub fn new(key_ref: &str, user_ref: &str, assigned_by: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            key_ref: key_ref.to_string(),
            user_ref: user_ref.to_string(),
            assigned_by: assigned_by.to_string(),
            assigned_at: Utc::now(),
            status: AssignmentStatus::Active,
            revoked_at: None,
            revoked_by: None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_assignment_is_active() {
        let assignment = Assignment::new("key-1", "user-1", "admin-1");
        assert!(assignment.is_active());
        assert_eq!(assignment.key_ref, "key-1");
        assert_eq!(assignment.user_ref, "user-1");
        assert_eq!(assignment.assigned_by, "admin-1");
        assert!(assignment.revoked_at.is_none());
        assert!(assignment.revoked_by.is_none());
    }

    #[test]
    fn assignment_ids_are_unique() {
        let a = Assignment::new("key-1", "user-1", "admin-1");
        let b = Assignment::new("key-1", "user-1", "admin-1");
        assert_ne!(a.id, b.id);
    }
}
