//! Provider trait consumed by the reconciler.

use crate::{Identity, ProviderEvent, ProviderResult};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Minimal identity provider surface the reconciler depends on.
///
/// Events are delivered sequentially, in order, on the channel returned by
/// [`subscribe`](IdentityProvider::subscribe); there is no concurrent
/// delivery. Every operation that changes the signed-in identity must also
/// emit a matching [`ProviderEvent::StateChanged`].
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Subscribe to identity state changes.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent>;

    /// Run the interactive sign-in flow (browser hand-off) to completion.
    async fn sign_in_interactive(&self) -> ProviderResult<Identity>;

    /// Sign the current identity out.
    async fn sign_out(&self) -> ProviderResult<()>;

    /// Return an id token for the signed-in identity, refreshing through the
    /// provider when `force_refresh` is set or the cached token expired.
    /// Returns `Ok(None)` when no identity is signed in.
    async fn id_token(&self, force_refresh: bool) -> ProviderResult<Option<String>>;
}
