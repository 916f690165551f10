use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use tether_core::{Peer, PeerError, CONNECTED_EVENT, ERROR_EVENT};

use crate::capability::Capability;

/// Reserved method the host serves for capability acquisition.
pub const LOAD_COMPONENTS: &str = "LoadComponents";

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// Caller misuse: raised before any handshake traffic.
    #[error("capability name must not be empty")]
    EmptyCapabilityName,

    #[error(transparent)]
    Rpc(#[from] PeerError),
}

/// A user script launched by the runtime.
///
/// `requires` is the injection descriptor: every listed plugin is resolved
/// in a single handshake and handed to `bind` before `system_did_enable`
/// runs. The hook fires exactly once per launch; a returned error surfaces
/// on the peer's `error` event and never poisons the peer.
#[async_trait]
pub trait Script: Send + Sync {
    /// Plugin names to resolve and bind before startup.
    fn requires(&self) -> Vec<String> {
        Vec::new()
    }

    /// Receives each required capability once resolved.
    fn bind(&mut self, _name: &str, _capability: Arc<Capability>) {}

    /// Startup hook, invoked once the capabilities are bound and the
    /// channel is live.
    async fn system_did_enable(&mut self) -> anyhow::Result<()>;
}

/// Script-side specialization of the peer: capability loading plus the
/// injection lifecycle.
pub struct ScriptRuntime {
    peer: Arc<Peer>,
    loaded: Mutex<HashMap<String, Arc<Capability>>>,
}

impl ScriptRuntime {
    pub fn new(peer: Arc<Peer>) -> Arc<Self> {
        Arc::new(ScriptRuntime {
            peer,
            loaded: Mutex::new(HashMap::new()),
        })
    }

    pub fn peer(&self) -> &Arc<Peer> {
        &self.peer
    }

    /// The stub for an already-loaded plugin.
    pub fn api(&self, name: &str) -> Option<Arc<Capability>> {
        self.lock_loaded().get(name).cloned()
    }

    /// Load the named plugins and return their stubs.
    ///
    /// Names not yet loaded are batched into a single `LoadComponents`
    /// call — one RPC for the whole missing set, never per-name. Already
    /// loaded names are served from the registry without touching the
    /// wire. The response body is ignored; stubs are synthesized locally.
    pub async fn load_apis(
        &self,
        names: &[&str],
    ) -> Result<HashMap<String, Arc<Capability>>, ScriptError> {
        if names.iter().any(|name| name.is_empty()) {
            return Err(ScriptError::EmptyCapabilityName);
        }

        let missing: Vec<String> = {
            let loaded = self.lock_loaded();
            let mut missing: Vec<String> = Vec::new();
            for name in names {
                if !loaded.contains_key(*name) && !missing.iter().any(|m| m == name) {
                    missing.push((*name).to_string());
                }
            }
            missing
        };

        if !missing.is_empty() {
            debug!(?missing, "requesting plugins from host");
            self.peer
                .call(LOAD_COMPONENTS, Some(json!([missing])))
                .await?;
            let mut loaded = self.lock_loaded();
            for name in &missing {
                loaded
                    .entry(name.clone())
                    .or_insert_with(|| Capability::new(Arc::clone(&self.peer), name.clone()));
            }
        }

        let loaded = self.lock_loaded();
        let mut result = HashMap::new();
        for name in names {
            if let Some(capability) = loaded.get(*name) {
                result.insert((*name).to_string(), Arc::clone(capability));
            }
        }
        Ok(result)
    }

    /// Launch a script: resolve its declared capabilities, bind them, and
    /// fire `system_did_enable` once. Returns the script so the embedder
    /// keeps its state; hook failures surface on the `error` event.
    pub async fn start<S: Script>(&self, mut script: S) -> Result<S, ScriptError> {
        let requires = script.requires();
        if requires.iter().any(String::is_empty) {
            return Err(ScriptError::EmptyCapabilityName);
        }

        if !requires.is_empty() {
            let names: Vec<&str> = requires.iter().map(String::as_str).collect();
            let resolved = self.load_apis(&names).await?;
            for name in &requires {
                if let Some(capability) = resolved.get(name) {
                    script.bind(name, Arc::clone(capability));
                }
            }
        }

        // The hook only fires on a live channel. A non-empty handshake
        // already implies connectivity; scripts with nothing to load may
        // still be waiting on a deferred transport.
        self.wait_for_connect().await;

        if let Err(err) = script.system_did_enable().await {
            self.peer.emit(
                ERROR_EVENT,
                &Value::String(format!("systemDidEnable failed: {:#}", err)),
            );
        }
        Ok(script)
    }

    async fn wait_for_connect(&self) {
        if self.peer.is_connected() {
            return;
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));
        let sender = Arc::clone(&slot);
        let subscription = self.peer.once(CONNECTED_EVENT, move |_| {
            if let Some(tx) = sender.lock().unwrap_or_else(|e| e.into_inner()).take() {
                let _ = tx.send(());
            }
        });

        // Connect may have slipped in between the check and the
        // subscription; re-check before parking on the channel.
        if self.peer.is_connected() {
            self.peer.off(CONNECTED_EVENT, subscription);
            return;
        }
        let _ = rx.await;
    }

    fn lock_loaded(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Capability>>> {
        self.loaded.lock().unwrap_or_else(|e| e.into_inner())
    }
}
