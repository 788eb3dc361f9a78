//! WebAuthn ceremony orchestration
//!
//! Implements the two-phase registration (attestation) and authentication
//! (assertion) ceremonies directly against the W3C WebAuthn specification:
//! [`types`] carries the wire structures, [`cbor`] decodes attestation
//! objects and authenticator data, [`crypto`] verifies client data and
//! assertion signatures, and [`engine`] ties them to the challenge store,
//! key repository and audit sink.

pub mod cbor;
pub mod crypto;
pub mod engine;
pub mod types;

pub use engine::{AuthenticationOutcome, CeremonyEngine};
