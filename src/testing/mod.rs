//! Testing utilities for vaultkey
//!
//! Consolidates the fixtures, mock sinks and the software authenticator the
//! test suites share. Available to integration tests through the `testing`
//! feature and to unit tests unconditionally.
//!
//! - [`fixtures`] - wired-up engine/service/store harness
//! - [`mock`] - in-memory and failing audit sinks
//! - [`authenticator`] - a software FIDO2 authenticator producing real
//!   attestations and signed assertions

pub mod authenticator;
pub mod fixtures;
pub mod mock;

pub use authenticator::SoftwareAuthenticator;
pub use fixtures::TestHarness;
pub use mock::{FailingAuditSink, MemoryAuditSink};

/// Common test constants
pub mod constants {
    /// Default test user reference
    pub const TEST_USER: &str = "user-1";

    /// Default admin caller reference
    pub const TEST_ADMIN: &str = "admin-1";

    /// Default test user email
    pub const TEST_EMAIL: &str = "user@example.com";
}
