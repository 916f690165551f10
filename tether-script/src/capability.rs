use serde_json::Value;
use std::sync::Arc;

use tether_core::{Peer, PeerError, Subscription};

/// Local proxy for a named plugin on the remote peer.
///
/// Method calls translate to RPCs on `<plugin>.<method>`; subscriptions
/// attach to notifications on `<plugin>.<Event>`. Stubs carry no remote
/// state — they are synthesized client-side and cached by the runtime.
pub struct Capability {
    peer: Arc<Peer>,
    name: String,
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability").field("name", &self.name).finish()
    }
}

impl Capability {
    pub(crate) fn new(peer: Arc<Peer>, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Capability {
            peer,
            name: name.into(),
        })
    }

    /// Call a plugin method and wait for its result.
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, PeerError> {
        self.peer
            .call(&self.wire_name(method), Some(Value::Array(args)))
            .await
    }

    /// Fire-and-forget variant of [`invoke`](Self::invoke).
    pub fn notify(&self, method: &str, args: Vec<Value>) -> Result<(), PeerError> {
        self.peer
            .notify(&self.wire_name(method), Some(Value::Array(args)))
    }

    /// Subscribe a handler to a plugin notification.
    ///
    /// Accepts the bare event name (`"ChooseSymbol"`) or the `on`-prefixed
    /// spelling (`"onChooseSymbol"`); either way the wire name is
    /// `<plugin>.ChooseSymbol`. This is a local subscription, not an RPC.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.peer.on(&self.event_wire_name(event), handler)
    }

    pub fn unsubscribe(&self, event: &str, subscription: Subscription) -> bool {
        self.peer.off(&self.event_wire_name(event), subscription)
    }

    fn wire_name(&self, method: &str) -> String {
        format!("{}.{}", self.name, method)
    }

    fn event_wire_name(&self, event: &str) -> String {
        self.wire_name(strip_on_prefix(event))
    }
}

/// `onChooseSymbol` is client-side sugar; the prefix never reaches the
/// wire. Only strip when an uppercase letter follows, so method-ish names
/// like `online` stay intact.
fn strip_on_prefix(event: &str) -> &str {
    match event.strip_prefix("on") {
        Some(rest) if rest.starts_with(char::is_uppercase) => rest,
        _ => event,
    }
}
