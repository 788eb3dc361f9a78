//! Error types for security key lifecycle operations
//!
//! Every failure the crate surfaces maps onto one of five kinds: `NotFound`,
//! `Conflict`, `Verification`, `Malformed` or `Unavailable`. Verification
//! failures carry a specific reason for server-side logs and audit trails, but
//! [`Error::public_message`] collapses them all into a generic authentication
//! failure so callers cannot probe which check rejected them.

use thiserror::Error;

/// Coarse classification of an [`Error`], used by callers to pick a transport
/// status and by logs to group failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced user, credential, challenge or assignment does not exist
    NotFound,
    /// The operation conflicts with current state (key not available,
    /// duplicate serial or credential id, lost optimistic-concurrency race)
    Conflict,
    /// A cryptographic or protocol check failed
    Verification,
    /// Untrusted binary input could not be decoded
    Malformed,
    /// A dependent store is unreachable or inconsistent
    Unavailable,
}

/// Errors produced by ceremony, assignment and storage operations
#[derive(Debug, Error)]
pub enum Error {
    /// No live challenge exists for the (user, ceremony) pair, it has passed
    /// its TTL, or the presented value was superseded by a newer challenge
    #[error("challenge expired or missing")]
    ChallengeExpiredOrMissing,

    /// Attestation payload failed transport decoding
    #[error("malformed attestation: {0}")]
    MalformedAttestation(String),

    /// Assertion payload failed transport decoding
    #[error("malformed assertion: {0}")]
    MalformedAssertion(String),

    /// Attestation rejected: signature, origin, rp id or policy mismatch
    #[error("attestation verification failed: {0}")]
    AttestationVerificationFailed(String),

    /// Assertion rejected: signature, origin, rp id or policy mismatch
    #[error("assertion verification failed: {0}")]
    AssertionVerificationFailed(String),

    /// The user has no actively assigned security keys
    #[error("no security keys assigned to this user")]
    NoCredentialsAssigned,

    /// The asserted credential does not exist or is not currently assigned
    #[error("security key not found")]
    CredentialNotFound,

    /// The asserted credential's active assignment belongs to another user
    #[error("security key is not owned by the authenticating user")]
    CredentialNotOwnedByUser,

    /// The key cannot be assigned because it is not in the Available state
    #[error("key is not available for assignment")]
    KeyNotAvailable,

    /// The key has no active assignment to revoke
    #[error("key is not currently assigned")]
    KeyNotAssigned,

    /// A uniquely constrained field already exists. `retryable` marks
    /// collisions of generated values (serial numbers) that a caller may
    /// retry, as opposed to genuine duplicates (credential ids)
    #[error("conflict: {detail}")]
    Conflict { detail: String, retryable: bool },

    /// A referenced record is absent
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The backing store failed or returned inconsistent data
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Deployment configuration rejected at construction time
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl Error {
    /// Conflict for a caller-supplied unique value
    #[must_use]
    pub fn duplicate(detail: impl Into<String>) -> Self {
        Error::Conflict {
            detail: detail.into(),
            retryable: false,
        }
    }

    /// Conflict for a generated unique value; the operation may be retried
    #[must_use]
    pub fn retryable_conflict(detail: impl Into<String>) -> Self {
        Error::Conflict {
            detail: detail.into(),
            retryable: true,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ChallengeExpiredOrMissing
            | Error::AttestationVerificationFailed(_)
            | Error::AssertionVerificationFailed(_)
            | Error::CredentialNotOwnedByUser => ErrorKind::Verification,
            Error::MalformedAttestation(_) | Error::MalformedAssertion(_) => ErrorKind::Malformed,
            Error::NoCredentialsAssigned | Error::CredentialNotFound | Error::NotFound(_) => {
                ErrorKind::NotFound
            }
            Error::KeyNotAvailable | Error::KeyNotAssigned | Error::Conflict { .. } => {
                ErrorKind::Conflict
            }
            Error::Unavailable(_) | Error::Configuration(_) => ErrorKind::Unavailable,
        }
    }

    /// Whether the caller may retry the same logical operation
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict { retryable: true, .. })
    }

    /// Message safe to return to the caller.
    ///
    /// Verification failures deliberately do not reveal which check failed;
    /// the specific reason stays in server-side logs and audit details.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Verification => "authentication failed",
            ErrorKind::Malformed => "malformed request payload",
            ErrorKind::NotFound => match self {
                Error::NoCredentialsAssigned => "no security keys assigned to this user",
                _ => "resource not found",
            },
            ErrorKind::Conflict => match self {
                Error::KeyNotAvailable => "key is not available for assignment",
                Error::KeyNotAssigned => "key is not currently assigned",
                _ => "conflicting request",
            },
            ErrorKind::Unavailable => "internal error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_failures_surface_generically() {
        let errors = [
            Error::ChallengeExpiredOrMissing,
            Error::AttestationVerificationFailed("origin mismatch".into()),
            Error::AssertionVerificationFailed("bad signature".into()),
            Error::CredentialNotOwnedByUser,
        ];
        for err in errors {
            assert_eq!(err.kind(), ErrorKind::Verification);
            assert_eq!(err.public_message(), "authentication failed");
        }
    }

    #[test]
    fn serial_collision_is_retryable() {
        let err = Error::retryable_conflict("serial number already exists");
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = Error::duplicate("credential id already registered");
        assert!(!err.is_retryable());
    }

    #[test]
    fn assignment_conflicts_keep_specific_public_messages() {
        assert_eq!(
            Error::KeyNotAvailable.public_message(),
            "key is not available for assignment"
        );
        assert_eq!(
            Error::KeyNotAssigned.public_message(),
            "key is not currently assigned"
        );
    }

    #[test]
    fn store_failures_are_opaque() {
        let err = Error::Unavailable("connection refused".into());
        assert_eq!(err.public_message(), "internal error");
        assert!(format!("{err}").contains("connection refused"));
    }
}
