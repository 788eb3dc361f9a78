//! Short-lived ceremony challenges
//!
//! A challenge is a single-purpose nonce bound to one (user, ceremony type)
//! pair. Issuing a new challenge for the same pair replaces the previous one,
//! so the latest issued value is always the only live value.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The two ceremony kinds sharing the challenge store plumbing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CeremonyType {
    Registration,
    Authentication,
}

impl CeremonyType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CeremonyType::Registration => "registration",
            CeremonyType::Authentication => "authentication",
        }
    }
}

impl std::fmt::Display for CeremonyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live ceremony challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub user_ref: String,
    pub ceremony: CeremonyType,
    /// Base64url-encoded random value (no padding), 32 bytes of entropy
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl Challenge {
    #[must_use]
    pub fn new(user_ref: &str, ceremony: CeremonyType, value: String) -> Self {
        Self {
            user_ref: user_ref.to_string(),
            ceremony,
            value,
            created_at: Utc::now(),
        }
    }

    /// Whether the challenge has outlived `ttl`.
    ///
    /// Checked at every read: an expired challenge must never verify, even if
    /// no sweep has removed it yet.
    #[must_use]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        Utc::now().signed_duration_since(self.created_at) > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_challenge_is_live() {
        let challenge = Challenge::new("user-1", CeremonyType::Registration, "abc".into());
        assert!(!challenge.is_expired(Duration::seconds(300)));
    }

    #[test]
    fn backdated_challenge_expires_without_a_sweep() {
        let mut challenge = Challenge::new("user-1", CeremonyType::Authentication, "abc".into());
        challenge.created_at = Utc::now() - Duration::seconds(301);
        assert!(challenge.is_expired(Duration::seconds(300)));
    }

    #[test]
    fn ceremony_type_round_trips_through_serde() {
        let json = serde_json::to_string(&CeremonyType::Registration).unwrap();
        assert_eq!(json, "\"registration\"");
        let back: CeremonyType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CeremonyType::Registration);
    }
}
