use crate::auth::TokenValidator;
use crate::error::HubError;
use crate::metrics::counters;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use trio_common::{Envelope, Role};

/// Handle held in the registry — used to queue envelopes to a connection.
#[derive(Clone, Debug)]
pub struct ConnHandle {
    /// Channel sender for delivering envelopes to this connection's task.
    pub tx: mpsc::Sender<Envelope>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    connections: HashMap<Role, ConnHandle>,
    b_token: Option<String>,
}

/// Role-keyed connection registry; the single source of truth for who is
/// connected.
///
/// The handle map and the current "b" token live behind one lock, so a
/// concurrent lookup observes either a fully applied registration or none at
/// all — never a token without its handle or vice versa.
#[derive(Debug)]
pub struct Registry {
    inner: Mutex<RegistryInner>,
    tokens: TokenValidator,
}

impl Registry {
    /// Create an empty registry accepting the given "b" tokens.
    #[must_use]
    pub fn new(tokens: TokenValidator) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            tokens,
        }
    }

    /// Insert `handle` under `role`, overwriting any previous handle for the
    /// same role (last writer wins; the displaced handle is not notified).
    ///
    /// For role "b" the token is checked first and stored on success, and
    /// role "c" is notified with `b_connected`. Returns the `registered` ack
    /// for the session to echo back.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidToken`] for a "b" registration whose token
    /// is not in the accepted set; no state is touched in that case.
    pub fn register(
        &self,
        role: Role,
        handle: ConnHandle,
        token: Option<&str>,
    ) -> Result<Envelope, HubError> {
        let mut inner = self.inner.lock();
        if role == Role::B {
            if !self.tokens.accepts(token) {
                return Err(HubError::InvalidToken);
            }
            inner.b_token = token.map(str::to_owned);
        }
        inner.connections.insert(role, handle);
        if role == Role::B {
            Self::push(
                &inner,
                Role::C,
                Envelope::b_connected(token.map(str::to_owned)),
            );
        }
        Ok(Envelope::registered(role))
    }

    /// Remove `role`'s handle if present.
    ///
    /// For role "b", notify "c" with `b_disconnected` carrying the stored
    /// token — null when none — and clear it. The notification fires even
    /// when no "b" handle was present.
    pub fn unregister(&self, role: Role) {
        let mut inner = self.inner.lock();
        inner.connections.remove(&role);
        if role == Role::B {
            let token = inner.b_token.take();
            Self::push(&inner, Role::C, Envelope::b_disconnected(token));
        }
    }

    /// Queue `envelope` to `target`'s current connection, if any.
    ///
    /// Best-effort: an absent target, a saturated queue, or a gone receiver
    /// all drop the envelope silently. Never blocks.
    pub fn forward(&self, target: Role, envelope: Envelope) {
        let inner = self.inner.lock();
        Self::push(&inner, target, envelope);
    }

    /// Queue `envelope` to role "c"'s current connection, if any.
    pub fn notify_c(&self, envelope: Envelope) {
        self.forward(Role::C, envelope);
    }

    /// Look up the current handle for `role`.
    #[must_use]
    pub fn get(&self, role: Role) -> Option<ConnHandle> {
        self.inner.lock().connections.get(&role).cloned()
    }

    /// Number of registered roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Returns `true` if no role is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().connections.is_empty()
    }

    fn push(inner: &RegistryInner, target: Role, envelope: Envelope) {
        let Some(handle) = inner.connections.get(&target) else {
            counters::envelopes_dropped_total("offline");
            return;
        };
        match handle.tx.try_send(envelope) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                counters::envelopes_dropped_total("backpressure");
                tracing::debug!(%target, "delivery queue full, dropping envelope");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                counters::envelopes_dropped_total("gone");
                tracing::debug!(%target, "receiver gone, dropping envelope");
            }
        }
    }
}
