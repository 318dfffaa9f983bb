//! Auth reconciliation core for the Warden auth engine.
//!
//! This crate provides:
//! - An explicit FSM for the authentication status
//! - The [`Reconciler`] service: the single authoritative decision point
//!   mapping identity provider events and persisted second-factor flags to
//!   the current session and status
//! - The error taxonomy surfaced to consumers

mod error;
mod fsm;
mod reconciler;
mod session;

pub use error::{AuthError, AuthResult};
pub use fsm::status_machine;
pub use fsm::{
    AuthStatus, StatusChangedPayload, StatusInput, StatusMachine, StatusMachineState,
};
pub use reconciler::{Reconciler, ReconcilerOptions, StatusCallback};
pub use session::{AuthSnapshot, Session};
