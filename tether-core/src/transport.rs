use crate::codec::Payload;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport failure: {0}")]
    Failed(String),
}

/// Lifecycle and traffic notifications a transport feeds into a peer.
#[derive(Debug)]
pub enum TransportEvent {
    /// An inbound payload, delivered in arrival order.
    Message(Payload),
    /// The channel became ready. Never emitted by transports that are open
    /// from construction.
    Open,
    /// The channel ended, with the failure that ended it if there was one.
    Closed(Option<TransportError>),
    /// A fault that did not end the channel.
    Error(TransportError),
}

/// An opaque message channel the peer drives.
///
/// Implementations deliver `TransportEvent`s to `Peer::handle_event` one at
/// a time; the peer only ever calls back through `send`.
pub trait Transport: Send + Sync {
    /// Hand a payload to the channel for delivery to the remote end.
    fn send(&self, payload: Payload) -> Result<(), TransportError>;

    /// Whether this transport reports an `Open` event. When false the
    /// channel is considered open from construction and the peer connects
    /// immediately.
    fn signals_connect(&self) -> bool {
        false
    }
}
