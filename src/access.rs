//! Caller identity supplied by the access control gate
//!
//! Authentication of admin callers (password login, TOTP) and role
//! enforcement happen outside this crate. The gate hands the core an
//! [`AuthenticatedCaller`] and the core trusts it; only the caller id is
//! recorded in assignment and audit trails.

use serde::{Deserialize, Serialize};

/// Organizational roles recognized by gate implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Manager,
    Admin,
}

impl Role {
    /// Whether this role satisfies a requirement for `required`.
    ///
    /// Roles are ordered: Admin covers Manager covers User.
    #[must_use]
    pub fn meets(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    fn rank(self) -> u8 {
        match self {
            Role::User => 0,
            Role::Manager => 1,
            Role::Admin => 2,
        }
    }
}

/// An identity the gate has already authenticated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedCaller {
    /// Opaque user reference
    pub id: String,
    pub role: Role,
}

impl AuthenticatedCaller {
    #[must_use]
    pub fn new(id: &str, role: Role) -> Self {
        Self {
            id: id.to_string(),
            role,
        }
    }
}

/// Interface implemented by the external access control gate.
///
/// The core never calls this itself; it exists so gate implementations and
/// the core agree on the identity shape crossing the seam.
pub trait AccessControlGate: Send + Sync {
    /// Resolve an opaque bearer token into an authenticated caller, or `None`
    /// when the token is invalid or expired
    fn authenticate(&self, token: &str) -> Option<AuthenticatedCaller>;

    /// Whether `caller` may perform operations requiring `required`
    fn authorize(&self, caller: &AuthenticatedCaller, required: Role) -> bool {
        caller.role.meets(required)
    }
}
