//! Symmetric JSON-RPC 2.0 peer for host/script plugin channels.
//!
//! Both ends of the channel run the same [`Peer`]: it correlates requests
//! with responses, fans notifications out to subscribers, buffers outbound
//! traffic until the transport connects, and speaks JSON text or MessagePack
//! per message. Capability loading and stubs live in `tether-script`;
//! concrete channels live in `tether-transport`.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod events;
pub mod ids;
pub mod peer;
pub mod transport;

pub use codec::{decode, encode, CodecError, Encoding, Payload};
pub use envelope::{Envelope, EnvelopeError, Outcome, VERSION};
pub use error::{PeerError, RpcError};
pub use events::{EventDispatcher, Subscription, ERROR_EVENT};
pub use ids::{RequestId, RequestIdAllocator};
pub use peer::{Peer, CONNECTED_EVENT, TRANSPORT_CLOSED_EVENT};
pub use transport::{Transport, TransportError, TransportEvent};

pub use async_trait::async_trait;
use serde_json::Value;

/// Inbound request routing.
///
/// How methods are tagged as callable and looked up is the embedder's
/// business; the peer only needs one entry point to hand a decoded request
/// to. Register an implementation with [`Peer::set_dispatcher`].
#[async_trait]
pub trait MethodDispatcher: Send + Sync {
    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError>;
}
