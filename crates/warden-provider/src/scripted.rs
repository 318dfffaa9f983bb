//! Scripted in-memory provider for tests.

use crate::{Identity, IdentityProvider, ProviderError, ProviderEvent, ProviderResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

/// Identity provider test double.
///
/// Events are pushed by the test through [`emit_state`](Self::emit_state) /
/// [`emit_fault`](Self::emit_fault); token issuance and interactive sign-in
/// return whatever the test scripted. An optional gate lets a test hold an
/// in-flight token fetch open to exercise interleaving.
#[derive(Default)]
pub struct ScriptedProvider {
    listeners: Mutex<Vec<mpsc::UnboundedSender<ProviderEvent>>>,
    identity: Mutex<Option<Identity>>,
    token: Mutex<Option<String>>,
    fail_token_fetch: AtomicBool,
    token_gate: Mutex<Option<Arc<Notify>>>,
    sign_out_calls: AtomicUsize,
    token_fetches: AtomicUsize,
}

impl ScriptedProvider {
    /// Create a provider with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the identity returned by `sign_in_interactive`.
    pub fn set_identity(&self, identity: Option<Identity>) {
        *self.identity.lock().unwrap() = identity;
    }

    /// Script the token returned by `id_token`.
    pub fn set_token(&self, token: Option<&str>) {
        *self.token.lock().unwrap() = token.map(String::from);
    }

    /// Make every subsequent `id_token` call fail.
    pub fn fail_tokens(&self, fail: bool) {
        self.fail_token_fetch.store(fail, Ordering::SeqCst);
    }

    /// Hold every `id_token` call until the gate is notified.
    pub fn gate_tokens(&self, gate: Arc<Notify>) {
        *self.token_gate.lock().unwrap() = Some(gate);
    }

    /// Emit a state-change event to all subscribers.
    pub fn emit_state(&self, identity: Option<Identity>) {
        self.emit(ProviderEvent::StateChanged(identity));
    }

    /// Emit a provider fault to all subscribers.
    pub fn emit_fault(&self, message: &str) {
        self.emit(ProviderEvent::Faulted(message.to_string()));
    }

    /// Number of `sign_out` calls observed.
    pub fn sign_out_count(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    /// Number of `id_token` calls observed.
    pub fn token_fetch_count(&self) -> usize {
        self.token_fetches.load(Ordering::SeqCst)
    }

    fn emit(&self, event: ProviderEvent) {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|sender| sender.send(event.clone()).is_ok());
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.listeners.lock().unwrap().push(sender);
        receiver
    }

    async fn sign_in_interactive(&self) -> ProviderResult<Identity> {
        let identity = self
            .identity
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::SignIn("no identity scripted".to_string()))?;
        self.emit(ProviderEvent::StateChanged(Some(identity.clone())));
        Ok(identity)
    }

    async fn sign_out(&self) -> ProviderResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        *self.identity.lock().unwrap() = None;
        self.emit(ProviderEvent::StateChanged(None));
        Ok(())
    }

    async fn id_token(&self, _force_refresh: bool) -> ProviderResult<Option<String>> {
        self.token_fetches.fetch_add(1, Ordering::SeqCst);

        let gate = self.token_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail_token_fetch.load(Ordering::SeqCst) {
            return Err(ProviderError::TokenRefresh("scripted failure".to_string()));
        }

        Ok(self.token.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_sign_in_emits_event() {
        let provider = ScriptedProvider::new();
        provider.set_identity(Some(Identity::new("u1", "a@warden.dev")));

        let mut events = provider.subscribe();
        let identity = provider.sign_in_interactive().await.unwrap();
        assert_eq!(identity.uid, "u1");

        match events.recv().await {
            Some(ProviderEvent::StateChanged(Some(identity))) => assert_eq!(identity.uid, "u1"),
            other => panic!("Expected StateChanged(Some), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn scripted_tokens_and_failures() {
        let provider = ScriptedProvider::new();
        assert_eq!(provider.id_token(false).await.unwrap(), None);

        provider.set_token(Some("tok"));
        assert_eq!(
            provider.id_token(false).await.unwrap().as_deref(),
            Some("tok")
        );

        provider.fail_tokens(true);
        assert!(provider.id_token(true).await.is_err());
        assert_eq!(provider.token_fetch_count(), 3);
    }

    #[tokio::test]
    async fn sign_out_is_counted_and_broadcast() {
        let provider = ScriptedProvider::new();
        let mut events = provider.subscribe();

        provider.sign_out().await.unwrap();
        assert_eq!(provider.sign_out_count(), 1);

        match events.recv().await {
            Some(ProviderEvent::StateChanged(None)) => {}
            other => panic!("Expected StateChanged(None), got {:?}", other),
        }
    }
}
