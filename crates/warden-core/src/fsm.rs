//! Authentication status state machine using rust-fsm.
//!
//! The status is never set directly: the reconciler computes an input from
//! the provider event and the persisted second-factor flags, and the machine
//! decides the resulting status. Repeated delivery of the same input is a
//! self-transition, which is what makes event handling idempotent.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │     Loading     │ (initial)
//! └────────┬────────┘
//!          │ IdentityVerified / IdentityUnverified /
//!          │ ProviderCleared / FallbackTimeout
//!          ▼
//! ┌─────────────────┐  IdentityUnverified   ┌──────────────────────┐
//! │ Unauthenticated │ ────────────────────► │ AwaitingSecondFactor │
//! └─────────────────┘                       └──────────┬───────────┘
//!          ▲                                           │ SecondFactorPassed /
//!          │ ProviderCleared / DomainRejected /        │ IdentityVerified
//!          │ SignedOut / Fault                         ▼
//!          │                                ┌─────────────────┐
//!          └─────────────────────────────── │  Authenticated  │
//!                                           └─────────────────┘
//!                       (IdentityUnverified from Authenticated drops back
//!                        to AwaitingSecondFactor: the user changed or the
//!                        verification flag was reset)
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

// Define the FSM using rust-fsm's declarative macro.
// This generates a module `status_machine` with:
// - status_machine::State (enum)
// - status_machine::Input (enum)
// - status_machine::StateMachine (type alias)
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub status_machine(Loading)

    Loading => {
        IdentityVerified => Authenticated,
        IdentityUnverified => AwaitingSecondFactor,
        ProviderCleared => Unauthenticated,
        DomainRejected => Unauthenticated,
        SignedOut => Unauthenticated,
        FallbackTimeout => Unauthenticated,
        Fault => Unauthenticated
    },
    Unauthenticated => {
        IdentityVerified => Authenticated,
        IdentityUnverified => AwaitingSecondFactor,
        ProviderCleared => Unauthenticated,
        DomainRejected => Unauthenticated,
        SignedOut => Unauthenticated,
        Fault => Unauthenticated
    },
    AwaitingSecondFactor => {
        SecondFactorPassed => Authenticated,
        IdentityVerified => Authenticated,
        IdentityUnverified => AwaitingSecondFactor,
        ProviderCleared => Unauthenticated,
        DomainRejected => Unauthenticated,
        SignedOut => Unauthenticated,
        Fault => Unauthenticated
    },
    Authenticated => {
        SecondFactorPassed => Authenticated,
        IdentityVerified => Authenticated,
        IdentityUnverified => AwaitingSecondFactor,
        ProviderCleared => Unauthenticated,
        DomainRejected => Unauthenticated,
        SignedOut => Unauthenticated,
        Fault => Unauthenticated
    }
}

// Re-export the generated types with clearer names
pub use status_machine::Input as StatusInput;
pub use status_machine::State as StatusMachineState;
pub use status_machine::StateMachine as StatusMachine;

/// Authentication status for external consumption.
///
/// Derived from the FSM state; consumers read it through the reconciler's
/// snapshot or subscription surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    /// Waiting for the first provider callback.
    Loading,
    /// No identity is signed in.
    Unauthenticated,
    /// An identity is signed in but the second factor is outstanding.
    AwaitingSecondFactor,
    /// Signed in and second-factor verified.
    Authenticated,
}

impl AuthStatus {
    /// Returns true only for the fully authenticated status.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthStatus::Authenticated)
    }

    /// Returns true while the initial provider callback is outstanding.
    pub fn is_loading(&self) -> bool {
        matches!(self, AuthStatus::Loading)
    }
}

impl From<&StatusMachineState> for AuthStatus {
    fn from(state: &StatusMachineState) -> Self {
        match state {
            StatusMachineState::Loading => AuthStatus::Loading,
            StatusMachineState::Unauthenticated => AuthStatus::Unauthenticated,
            StatusMachineState::AwaitingSecondFactor => AuthStatus::AwaitingSecondFactor,
            StatusMachineState::Authenticated => AuthStatus::Authenticated,
        }
    }
}

/// Payload for status change notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangedPayload {
    /// Current status.
    pub status: AuthStatus,
    /// Identity user id, when signed in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// User email, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_loading() {
        let machine = StatusMachine::new();
        assert_eq!(*machine.state(), StatusMachineState::Loading);
    }

    #[test]
    fn verified_identity_authenticates_from_loading() {
        let mut machine = StatusMachine::new();
        machine.consume(&StatusInput::IdentityVerified).unwrap();
        assert_eq!(*machine.state(), StatusMachineState::Authenticated);
    }

    #[test]
    fn unverified_identity_awaits_second_factor() {
        let mut machine = StatusMachine::new();
        machine.consume(&StatusInput::IdentityUnverified).unwrap();
        assert_eq!(*machine.state(), StatusMachineState::AwaitingSecondFactor);

        machine.consume(&StatusInput::SecondFactorPassed).unwrap();
        assert_eq!(*machine.state(), StatusMachineState::Authenticated);
    }

    #[test]
    fn provider_cleared_resolves_unauthenticated() {
        let mut machine = StatusMachine::new();
        machine.consume(&StatusInput::ProviderCleared).unwrap();
        assert_eq!(*machine.state(), StatusMachineState::Unauthenticated);
    }

    #[test]
    fn user_switch_drops_back_to_second_factor() {
        let mut machine = StatusMachine::new();
        machine.consume(&StatusInput::IdentityVerified).unwrap();
        assert_eq!(*machine.state(), StatusMachineState::Authenticated);

        // The reconciler reports the switched user as unverified.
        machine.consume(&StatusInput::IdentityUnverified).unwrap();
        assert_eq!(*machine.state(), StatusMachineState::AwaitingSecondFactor);
    }

    #[test]
    fn redelivery_is_a_self_transition() {
        let mut machine = StatusMachine::new();
        machine.consume(&StatusInput::IdentityUnverified).unwrap();
        machine.consume(&StatusInput::IdentityUnverified).unwrap();
        assert_eq!(*machine.state(), StatusMachineState::AwaitingSecondFactor);

        machine.consume(&StatusInput::IdentityVerified).unwrap();
        machine.consume(&StatusInput::IdentityVerified).unwrap();
        assert_eq!(*machine.state(), StatusMachineState::Authenticated);
    }

    #[test]
    fn sign_out_clears_any_settled_state() {
        let mut machine = StatusMachine::new();
        machine.consume(&StatusInput::IdentityVerified).unwrap();
        machine.consume(&StatusInput::SignedOut).unwrap();
        assert_eq!(*machine.state(), StatusMachineState::Unauthenticated);
    }

    #[test]
    fn fallback_timeout_only_applies_while_loading() {
        let mut machine = StatusMachine::new();
        machine.consume(&StatusInput::IdentityVerified).unwrap();
        assert!(machine.consume(&StatusInput::FallbackTimeout).is_err());

        let mut machine = StatusMachine::new();
        machine.consume(&StatusInput::FallbackTimeout).unwrap();
        assert_eq!(*machine.state(), StatusMachineState::Unauthenticated);
    }

    #[test]
    fn second_factor_cannot_pass_without_identity() {
        let mut machine = StatusMachine::new();
        assert!(machine.consume(&StatusInput::SecondFactorPassed).is_err());

        machine.consume(&StatusInput::ProviderCleared).unwrap();
        assert!(machine.consume(&StatusInput::SecondFactorPassed).is_err());
    }

    #[test]
    fn fault_is_legal_everywhere() {
        for input in [
            StatusInput::IdentityVerified,
            StatusInput::IdentityUnverified,
            StatusInput::ProviderCleared,
        ] {
            let mut machine = StatusMachine::new();
            machine.consume(&input).unwrap();
            machine.consume(&StatusInput::Fault).unwrap();
            assert_eq!(*machine.state(), StatusMachineState::Unauthenticated);
        }
    }

    #[test]
    fn status_conversion() {
        assert_eq!(
            AuthStatus::from(&StatusMachineState::Loading),
            AuthStatus::Loading
        );
        assert_eq!(
            AuthStatus::from(&StatusMachineState::Unauthenticated),
            AuthStatus::Unauthenticated
        );
        assert_eq!(
            AuthStatus::from(&StatusMachineState::AwaitingSecondFactor),
            AuthStatus::AwaitingSecondFactor
        );
        assert_eq!(
            AuthStatus::from(&StatusMachineState::Authenticated),
            AuthStatus::Authenticated
        );
    }

    #[test]
    fn status_predicates() {
        assert!(AuthStatus::Authenticated.is_authenticated());
        assert!(!AuthStatus::AwaitingSecondFactor.is_authenticated());
        assert!(!AuthStatus::Loading.is_authenticated());
        assert!(AuthStatus::Loading.is_loading());
        assert!(!AuthStatus::Unauthenticated.is_loading());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AuthStatus::AwaitingSecondFactor).unwrap(),
            r#""awaiting_second_factor""#
        );
    }
}
