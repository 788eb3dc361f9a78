#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! # vaultkey
//!
//! Lifecycle management for FIDO2/WebAuthn hardware security keys issued to
//! the employees of an organization: ceremony-based registration, binding of
//! keys to user identities, assertion-based authentication and revocation.
//!
//! The [`ceremony::CeremonyEngine`] drives the WebAuthn attestation and
//! assertion ceremonies against a [`storage::ChallengeStore`] and a
//! [`storage::KeyRepository`]; the [`keys::KeyService`] owns the
//! one-key-to-at-most-one-user assignment state machine. Every security
//! relevant transition is reported to an [`audit::AuditSink`]. HTTP routing,
//! admin login and the persistence engine itself live outside this crate.

/// Version of the vaultkey crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod access;
pub mod audit;
pub mod ceremony;
pub mod error;
pub mod keys;
pub mod models;
pub mod settings;
pub mod storage;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use access::{AccessControlGate, AuthenticatedCaller, Role};
pub use audit::{AuditAction, AuditRecord, AuditSink, LogAuditSink};
pub use ceremony::{AuthenticationOutcome, CeremonyEngine};
pub use error::{Error, ErrorKind};
pub use keys::{InventoryReport, KeyDetails, KeyService};
pub use models::{Assignment, AssignmentStatus, CeremonyType, Challenge, Credential, KeyStatus};
pub use settings::VaultkeySettings;
