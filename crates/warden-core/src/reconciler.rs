//! The auth reconciliation service.
//!
//! The [`Reconciler`] is the single authoritative decision point mapping
//! identity provider events and persisted second-factor flags to the current
//! [`Session`] and [`AuthStatus`]. It guarantees:
//! - `verified == true` always refers to the currently signed-in user
//! - a user switch resets the second-factor state (memory and store) before
//!   the status is computed
//! - the status resolves before token fetch and backend sync complete, and
//!   neither of those can fail the transition
//! - results of async continuations are applied only if no later event
//!   arrived in the meantime (per-event epoch counter)

use crate::fsm::{AuthStatus, StatusChangedPayload, StatusInput};
use crate::{AuthError, AuthResult, AuthSnapshot, Session, StatusMachine};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use warden_backend::{BackendError, SyncApi, TotpSetup, TotpStatus};
use warden_provider::{Identity, IdentityProvider, ProviderEvent};
use warden_storage::{PersistedFlags, VerificationState};

/// Callback type for status change notifications.
pub type StatusCallback = Box<dyn Fn(StatusChangedPayload) + Send + Sync>;

/// Reconciler tuning options.
#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    /// Email suffix a signed-in identity must carry; `None` disables the
    /// domain policy.
    pub allowed_email_domain: Option<String>,
    /// Window after which a silent provider forces `Unauthenticated`.
    pub loading_fallback: Duration,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            allowed_email_domain: None,
            loading_fallback: Duration::from_millis(
                warden_config::DEFAULT_LOADING_FALLBACK_MS,
            ),
        }
    }
}

impl ReconcilerOptions {
    /// Derive options from the engine configuration.
    pub fn from_config(config: &warden_config::Config) -> Self {
        Self {
            allowed_email_domain: Some(config.allowed_email_domain.clone()),
            loading_fallback: Duration::from_millis(config.loading_fallback_ms),
        }
    }
}

/// Mutable state owned by the reconciler; one logical writer.
struct ReconcilerState {
    fsm: StatusMachine,
    session: Option<Session>,
    /// In-memory mirror of the persisted verification state.
    verification: VerificationState,
    /// Bumped on every event; async continuations carry the value they were
    /// started under and discard their result on mismatch.
    epoch: u64,
    saw_provider_event: bool,
    last_error: Option<String>,
}

impl ReconcilerState {
    fn new() -> Self {
        Self {
            fsm: StatusMachine::new(),
            session: None,
            verification: VerificationState::default(),
            epoch: 0,
            saw_provider_event: false,
            last_error: None,
        }
    }

    fn status(&self) -> AuthStatus {
        AuthStatus::from(self.fsm.state())
    }
}

/// What is left to do after the synchronous portion of an event was applied.
enum Continuation {
    Settled,
    DomainRejected,
    Resolve { identity: Identity, epoch: u64 },
}

/// The auth reconciliation service.
pub struct Reconciler {
    provider: Arc<dyn IdentityProvider>,
    backend: Arc<dyn SyncApi>,
    flags: Arc<PersistedFlags>,
    state: Mutex<ReconcilerState>,
    callback: Mutex<Option<StatusCallback>>,
    options: ReconcilerOptions,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        backend: Arc<dyn SyncApi>,
        flags: Arc<PersistedFlags>,
        options: ReconcilerOptions,
    ) -> Self {
        Self {
            provider,
            backend,
            flags,
            state: Mutex::new(ReconcilerState::new()),
            callback: Mutex::new(None),
            options,
        }
    }

    /// Set a callback to be notified whenever the status changes.
    pub fn set_status_callback(&self, callback: StatusCallback) {
        let mut cb = self.callback.lock().unwrap();
        *cb = Some(callback);
    }

    /// Current status.
    pub fn status(&self) -> AuthStatus {
        self.state.lock().unwrap().status()
    }

    /// Read-only view of the full reconciler state.
    pub fn snapshot(&self) -> AuthSnapshot {
        let st = self.state.lock().unwrap();
        AuthSnapshot {
            status: st.status(),
            user_id: st.session.as_ref().map(|s| s.identity_user_id.clone()),
            email: st.session.as_ref().and_then(|s| s.email.clone()),
            role: st.session.as_ref().and_then(|s| s.role.clone()),
            profile_id: st.session.as_ref().and_then(|s| s.profile_id.clone()),
            second_factor_verified: st.verification.verified,
            last_error: st.last_error.clone(),
        }
    }

    /// Most recent surfaced error, if any.
    pub fn last_error(&self) -> Option<String> {
        self.state.lock().unwrap().last_error.clone()
    }

    /// Clear the surfaced error slot.
    pub fn clear_error(&self) {
        self.state.lock().unwrap().last_error = None;
    }

    /// Subscribe to the provider and drive events until its channel closes.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let events = self.provider.subscribe();
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(events).await })
    }

    /// Event loop body; events are processed strictly in order.
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<ProviderEvent>) {
        self.arm_loading_fallback();
        while let Some(event) = events.recv().await {
            match event {
                ProviderEvent::StateChanged(identity) => {
                    self.handle_provider_event(identity).await;
                }
                ProviderEvent::Faulted(message) => {
                    self.handle_provider_fault(&message);
                }
            }
        }
        debug!("Provider event channel closed, reconciler loop ending");
    }

    /// Force `Unauthenticated` if the provider never calls back.
    pub fn arm_loading_fallback(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.options.loading_fallback).await;
            this.force_loading_timeout();
        });
    }

    fn force_loading_timeout(&self) {
        let changed = {
            let mut st = self.state.lock().unwrap();
            if st.saw_provider_event || !st.status().is_loading() {
                return;
            }
            warn!("No provider callback within the fallback window, forcing unauthenticated");
            self.transition_locked(&mut st, &StatusInput::FallbackTimeout)
                .unwrap_or(false)
        };
        if changed {
            self.notify();
        }
    }

    /// Apply a provider state-change event.
    ///
    /// Never propagates an error to the caller: the provider's callback
    /// channel must keep working for subsequent events, so any unexpected
    /// failure resolves the status to `Unauthenticated` and fills the error
    /// slot instead.
    pub async fn handle_provider_event(&self, identity: Option<Identity>) -> AuthStatus {
        match self.reconcile(identity).await {
            Ok(status) => status,
            Err(error) => {
                warn!(%error, "Provider event handling failed");
                self.fail_closed(&error.to_string())
            }
        }
    }

    /// Apply a provider fault: all state is dropped, status resolves to
    /// `Unauthenticated`, the message lands in the error slot.
    pub fn handle_provider_fault(&self, message: &str) -> AuthStatus {
        warn!(message, "Identity provider fault");
        self.fail_closed(message)
    }

    async fn reconcile(&self, identity: Option<Identity>) -> AuthResult<AuthStatus> {
        // The decision and every state write happen as one unit under the
        // lock; only token fetch and backend sync run afterwards, guarded by
        // the epoch captured here.
        let (continuation, changed) = {
            let mut st = self.state.lock().unwrap();
            st.saw_provider_event = true;
            st.epoch += 1;
            let epoch = st.epoch;

            match identity {
                None => {
                    let was_verified =
                        st.verification.verified || self.flags.get_verification()?.verified;
                    st.session = None;
                    st.verification = VerificationState::default();
                    if was_verified {
                        debug!("Identity gone while verified, clearing persisted flags");
                        self.flags.clear_verification()?;
                    }
                    let changed =
                        self.transition_locked(&mut st, &StatusInput::ProviderCleared)?;
                    (Continuation::Settled, changed)
                }
                Some(identity) => {
                    if !self.domain_allows(identity.email.as_deref()) {
                        let email = identity.email.clone().unwrap_or_default();
                        warn!(email = %email, "Identity rejected by domain policy");
                        st.session = None;
                        st.verification = VerificationState::default();
                        st.last_error = Some(AuthError::DomainRejected(email).to_string());
                        self.flags.clear_verification()?;
                        let changed =
                            self.transition_locked(&mut st, &StatusInput::DomainRejected)?;
                        (Continuation::DomainRejected, changed)
                    } else {
                        let user_changed = st
                            .session
                            .as_ref()
                            .is_some_and(|s| s.identity_user_id != identity.uid);

                        if user_changed {
                            info!(
                                user_id = %identity.uid,
                                "Identity user changed, resetting second-factor state"
                            );
                            st.verification = VerificationState::default();
                            self.flags.clear_verification()?;
                        } else if !st.verification.verified {
                            // Session resumption across restarts: restore the
                            // flag only when it belongs to this same user.
                            let stored = self.flags.get_verification()?;
                            if stored.covers(&identity.uid) {
                                info!(
                                    user_id = %identity.uid,
                                    "Restoring second-factor verification from persisted flags"
                                );
                                st.verification = stored;
                            }
                        }

                        match st.session.as_mut() {
                            Some(session) if session.identity_user_id == identity.uid => {
                                session.email = identity.email.clone();
                            }
                            _ => st.session = Some(Session::from_identity(&identity)),
                        }

                        let input = if st.verification.covers(&identity.uid) {
                            StatusInput::IdentityVerified
                        } else {
                            StatusInput::IdentityUnverified
                        };
                        if st.verification.verified {
                            self.flags.set_verification(&st.verification)?;
                        }
                        let changed = self.transition_locked(&mut st, &input)?;
                        (Continuation::Resolve { identity, epoch }, changed)
                    }
                }
            }
        };

        if changed {
            self.notify();
        }

        match continuation {
            Continuation::Settled => {}
            Continuation::DomainRejected => {
                if let Err(error) = self.provider.sign_out().await {
                    warn!(%error, "Provider sign-out after domain rejection failed");
                }
            }
            Continuation::Resolve { identity, epoch } => {
                self.resolve_token_and_sync(&identity, epoch).await;
            }
        }

        Ok(self.status())
    }

    /// Token fetch and backend sync for a resolved identity.
    ///
    /// The status was already decided; nothing here may demote it. Each
    /// write re-checks the epoch so a later event wins over a slow fetch.
    async fn resolve_token_and_sync(&self, identity: &Identity, epoch: u64) {
        let token = match self.provider.id_token(false).await {
            Ok(token) => token,
            Err(error) => {
                warn!(
                    user_id = %identity.uid,
                    %error,
                    "Id token fetch failed, continuing without token"
                );
                let mut st = self.state.lock().unwrap();
                if st.epoch == epoch {
                    st.last_error =
                        Some(AuthError::TokenUnavailable(error.to_string()).to_string());
                }
                None
            }
        };

        let Some(token) = token else {
            debug!(user_id = %identity.uid, "No id token available, skipping user sync");
            return;
        };

        {
            let mut st = self.state.lock().unwrap();
            if st.epoch != epoch {
                debug!("Discarding stale token fetch result");
                return;
            }
            if let Some(session) = st.session.as_mut() {
                if session.identity_user_id == identity.uid {
                    session.id_token = Some(token.clone());
                }
            }
        }

        self.sync_user(identity, epoch, token).await;
    }

    async fn sync_user(&self, identity: &Identity, epoch: u64, token: String) {
        let result = match self.backend.sync_user(&token).await {
            Err(BackendError::Status { status: 401, .. }) => {
                // The token went stale between fetch and sync: refresh once
                // through the provider and retry.
                debug!("User sync got 401, refreshing token and retrying once");
                match self.provider.id_token(true).await {
                    Ok(Some(fresh)) => {
                        {
                            let mut st = self.state.lock().unwrap();
                            if st.epoch == epoch {
                                if let Some(session) = st.session.as_mut() {
                                    if session.identity_user_id == identity.uid {
                                        session.id_token = Some(fresh.clone());
                                    }
                                }
                            }
                        }
                        self.backend.sync_user(&fresh).await
                    }
                    Ok(None) => Err(BackendError::Status {
                        status: 401,
                        body: "no token available after refresh".to_string(),
                    }),
                    Err(error) => {
                        warn!(%error, "Token refresh for sync retry failed");
                        return;
                    }
                }
            }
            other => other,
        };

        match result {
            Ok(user) => {
                let mut st = self.state.lock().unwrap();
                if st.epoch != epoch {
                    debug!("Discarding stale sync result");
                    return;
                }
                if let Some(session) = st.session.as_mut() {
                    if session.identity_user_id == identity.uid {
                        session.profile_id = Some(user.id.clone());
                        session.role = user.role.clone();
                        info!(
                            user_id = %identity.uid,
                            profile_id = %user.id,
                            role = ?user.role,
                            "User synced with backend"
                        );
                    }
                }
            }
            Err(error) => {
                // Sync failure never blocks the resolved status.
                let classified = AuthError::SyncFailed(error.to_string());
                warn!(user_id = %identity.uid, error = %classified, "User sync failed");
            }
        }
    }

    /// Run the interactive sign-in flow.
    ///
    /// The resulting provider event drives the status; this call only
    /// enforces the domain policy eagerly and resets the second-factor state
    /// so a fresh login always requires a new verification.
    pub async fn sign_in(&self) -> AuthResult<Identity> {
        self.clear_error();

        let identity = match self.provider.sign_in_interactive().await {
            Ok(identity) => identity,
            Err(error) => {
                let classified = AuthError::Provider(error);
                self.record_error(&classified);
                return Err(classified);
            }
        };

        if !self.domain_allows(identity.email.as_deref()) {
            let classified =
                AuthError::DomainRejected(identity.email.clone().unwrap_or_default());
            self.record_error(&classified);
            if let Err(error) = self.provider.sign_out().await {
                warn!(%error, "Provider sign-out after domain rejection failed");
            }
            return Err(classified);
        }

        self.reset_second_factor()?;

        Ok(identity)
    }

    /// Drop the second-factor state (memory and store) for the current user.
    fn reset_second_factor(&self) -> AuthResult<()> {
        let changed = {
            let mut st = self.state.lock().unwrap();
            st.verification = VerificationState::default();
            self.flags.clear_verification()?;
            if st.session.is_some() && st.status().is_authenticated() {
                self.transition_locked(&mut st, &StatusInput::IdentityUnverified)?
            } else {
                false
            }
        };
        if changed {
            self.notify();
        }
        Ok(())
    }

    /// Verify a second-factor code with the backend.
    ///
    /// On success the verification state is committed (memory and store, one
    /// write) and the status becomes `Authenticated`. On failure nothing is
    /// mutated and the classified error propagates to the caller. If a newer
    /// provider event replaced the session while the code was in flight, the
    /// newer session wins and the verification is discarded.
    pub async fn complete_second_factor(&self, code: &str) -> AuthResult<()> {
        let (uid, token) = {
            let st = self.state.lock().unwrap();
            let session = st.session.as_ref().ok_or(AuthError::NotSignedIn)?;
            (session.identity_user_id.clone(), session.id_token.clone())
        };

        let token = match token {
            Some(token) => token,
            None => self
                .provider
                .id_token(false)
                .await
                .map_err(|e| AuthError::TokenUnavailable(e.to_string()))?
                .ok_or_else(|| {
                    AuthError::TokenUnavailable("no id token for verification".to_string())
                })?,
        };

        match self.backend.verify_totp(&token, code).await {
            Ok(()) => {
                let changed = {
                    let mut st = self.state.lock().unwrap();
                    let still_current = st
                        .session
                        .as_ref()
                        .is_some_and(|s| s.identity_user_id == uid);
                    if !still_current {
                        warn!(
                            user_id = %uid,
                            "Verification completed for a superseded session, discarding"
                        );
                        return Err(AuthError::VerificationSuperseded);
                    }

                    let session_id = st.verification.session_id.take();
                    st.verification = VerificationState {
                        verified: true,
                        verified_user_id: Some(uid.clone()),
                        session_id,
                    };
                    self.flags.set_verification(&st.verification)?;
                    self.transition_locked(&mut st, &StatusInput::SecondFactorPassed)?
                };
                if changed {
                    self.notify();
                }
                info!(user_id = %uid, "Second factor verified");
                Ok(())
            }
            Err(error) => {
                let classified = AuthError::from(error);
                self.record_error(&classified);
                Err(classified)
            }
        }
    }

    /// Provision a TOTP secret for the signed-in user.
    pub async fn setup_second_factor(&self) -> AuthResult<TotpSetup> {
        let token = self.require_token().await?;
        self.backend.setup_totp(&token).await.map_err(|error| {
            let classified = AuthError::from(error);
            self.record_error(&classified);
            classified
        })
    }

    /// Fetch the second-factor configuration status for the signed-in user.
    pub async fn second_factor_status(&self) -> AuthResult<TotpStatus> {
        let token = self.require_token().await?;
        Ok(self.backend.totp_status(&token).await?)
    }

    /// Sign out: provider sign-out, then session and second-factor state are
    /// dropped together, memory and store.
    pub async fn sign_out(&self) -> AuthResult<()> {
        if let Err(error) = self.provider.sign_out().await {
            warn!(%error, "Provider sign-out failed, clearing local state anyway");
        }

        let changed = {
            let mut st = self.state.lock().unwrap();
            // Invalidate any in-flight token or sync continuation.
            st.epoch += 1;
            st.session = None;
            st.verification = VerificationState::default();
            self.flags.clear_verification()?;
            self.transition_locked(&mut st, &StatusInput::SignedOut)?
        };
        if changed {
            self.notify();
        }

        info!("Signed out");
        Ok(())
    }

    /// Current id token, refreshing through the provider when requested or
    /// when no token is cached. Returns `Ok(None)` when no session exists or
    /// the fetch degraded; the error slot records the latter.
    pub async fn get_token(&self, force_refresh: bool) -> AuthResult<Option<String>> {
        let (uid, cached) = {
            let st = self.state.lock().unwrap();
            match st.session.as_ref() {
                Some(session) => (
                    session.identity_user_id.clone(),
                    session.id_token.clone(),
                ),
                None => return Ok(None),
            }
        };

        if !force_refresh {
            if let Some(token) = cached {
                return Ok(Some(token));
            }
        }

        match self.provider.id_token(force_refresh).await {
            Ok(Some(token)) => {
                let mut st = self.state.lock().unwrap();
                if let Some(session) = st.session.as_mut() {
                    if session.identity_user_id == uid {
                        session.id_token = Some(token.clone());
                    }
                }
                Ok(Some(token))
            }
            Ok(None) => Ok(None),
            Err(error) => {
                warn!(%error, "Token fetch failed");
                self.record_error(&AuthError::TokenUnavailable(error.to_string()));
                Ok(None)
            }
        }
    }

    async fn require_token(&self) -> AuthResult<String> {
        self.get_token(false).await?.ok_or_else(|| {
            AuthError::TokenUnavailable("no session token available".to_string())
        })
    }

    /// Drop everything and resolve `Unauthenticated` without propagating.
    fn fail_closed(&self, message: &str) -> AuthStatus {
        let (status, changed) = {
            let mut st = self.state.lock().unwrap();
            st.saw_provider_event = true;
            st.epoch += 1;
            st.session = None;
            st.verification = VerificationState::default();
            st.last_error = Some(message.to_string());
            let changed = self
                .transition_locked(&mut st, &StatusInput::Fault)
                .unwrap_or(false);
            (st.status(), changed)
        };

        if let Err(error) = self.flags.clear_verification() {
            warn!(%error, "Failed to clear persisted verification state");
        }
        if changed {
            self.notify();
        }
        status
    }

    fn domain_allows(&self, email: Option<&str>) -> bool {
        match &self.options.allowed_email_domain {
            Some(suffix) => email.map(|e| e.ends_with(suffix.as_str())).unwrap_or(false),
            None => true,
        }
    }

    fn record_error(&self, error: &AuthError) {
        self.state.lock().unwrap().last_error = Some(error.to_string());
    }

    /// Consume an FSM input and report whether the status changed.
    fn transition_locked(
        &self,
        st: &mut ReconcilerState,
        input: &StatusInput,
    ) -> AuthResult<bool> {
        let old_status = st.status();
        st.fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                st.fsm.state()
            ))
        })?;
        let new_status = st.status();

        if old_status != new_status {
            debug!(
                old_status = ?old_status,
                new_status = ?new_status,
                "Auth status transition"
            );
        }

        Ok(old_status != new_status)
    }

    /// Notify the callback with the current status and session identity.
    fn notify(&self) {
        let payload = {
            let st = self.state.lock().unwrap();
            StatusChangedPayload {
                status: st.status(),
                user_id: st.session.as_ref().map(|s| s.identity_user_id.clone()),
                email: st.session.as_ref().and_then(|s| s.email.clone()),
            }
        };

        let cb = self.callback.lock().unwrap();
        if let Some(callback) = cb.as_ref() {
            callback(payload);
        }
    }
}
