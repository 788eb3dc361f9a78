//! Domain records for security keys, assignments and ceremony challenges

pub mod assignment;
pub mod challenge;
pub mod credential;

pub use assignment::{Assignment, AssignmentStatus};
pub use challenge::{CeremonyType, Challenge};
pub use credential::{Credential, KeyFilter, KeyStatus};
