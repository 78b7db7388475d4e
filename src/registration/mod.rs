//! Registration: onboarding of new senders.
//!
//! A sender picks a language and a display name; the user record is
//! created and the scratch session deleted in one step.

pub mod machine;
pub mod model;
pub mod state;

pub use machine::{MIN_NAME_CHARS, RegistrationMachine, StepOutcome};
pub use model::{RegistrationSession, RegistrationStatus, User};
pub use state::{RegistrationPhase, RegistrationStep};
