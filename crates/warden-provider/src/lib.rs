//! Identity provider adapter for the Warden auth engine.
//!
//! The reconciler never talks to the hosted identity service directly; it
//! consumes the [`IdentityProvider`] trait. This crate provides:
//! - the trait and the event stream contract
//! - [`HostedProvider`], the production implementation (browser hand-off
//!   login, cached token material, refresh over HTTP)
//! - [`ScriptedProvider`], an in-memory implementation for tests

mod adapter;
mod error;
mod hosted;
mod scripted;
mod types;

pub use adapter::IdentityProvider;
pub use error::{ProviderError, ProviderResult};
pub use hosted::HostedProvider;
pub use scripted::ScriptedProvider;
pub use types::{Identity, ProviderEvent};
