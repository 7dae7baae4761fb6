//! Bearer credential sources.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

/// Supplies the bearer credential attached to every request.
pub trait TokenProvider: Send + Sync + 'static {
    fn token(&self) -> Option<String>;

    /// Called when the server rejects the credential with `401`.
    fn on_unauthorized(&self) {}
}

/// A fixed credential.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.is_empty()))
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// A credential slot shared with whatever handles login.
///
/// A `401` clears the slot: the session is over until a new token is set.
#[derive(Debug, Clone, Default)]
pub struct SharedToken {
    slot: Arc<RwLock<Option<String>>>,
}

impl SharedToken {
    pub fn new(token: Option<String>) -> Self {
        Self {
            slot: Arc::new(RwLock::new(token)),
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.slot.write() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.slot.write() = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.slot.read().is_some()
    }
}

impl TokenProvider for SharedToken {
    fn token(&self) -> Option<String> {
        self.slot.read().clone()
    }

    fn on_unauthorized(&self) {
        if self.slot.write().take().is_some() {
            warn!("Credential rejected by server; session cleared");
        }
    }
}
