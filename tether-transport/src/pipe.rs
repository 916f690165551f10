//! Linked in-memory endpoints for peer-to-peer communication in one process.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::trace;

use tether_core::{Payload, Peer, Transport, TransportError, TransportEvent};

/// One end of an in-memory pipe.
///
/// Payloads handed to `send` surface as `Message` events on the opposite
/// end. Ends from [`PipeEnd::pair`] are open from construction; ends from
/// [`PipeEnd::pair_deferred`] report a connect signal and stay silent until
/// [`PipeEnd::open`] is called.
pub struct PipeEnd {
    outbound: mpsc::UnboundedSender<TransportEvent>,
    local: mpsc::UnboundedSender<TransportEvent>,
    inbox: Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
    deferred: bool,
}

impl PipeEnd {
    /// A linked pair, open from construction.
    pub fn pair() -> (Arc<PipeEnd>, Arc<PipeEnd>) {
        Self::linked(false)
    }

    /// A linked pair whose ends emit `Open` only once `open()` is called.
    pub fn pair_deferred() -> (Arc<PipeEnd>, Arc<PipeEnd>) {
        Self::linked(true)
    }

    fn linked(deferred: bool) -> (Arc<PipeEnd>, Arc<PipeEnd>) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Arc::new(PipeEnd {
            outbound: tx_b.clone(),
            local: tx_a.clone(),
            inbox: Mutex::new(rx_a),
            deferred,
        });
        let b = Arc::new(PipeEnd {
            outbound: tx_a,
            local: tx_b,
            inbox: Mutex::new(rx_b),
            deferred,
        });
        (a, b)
    }

    /// Mark this end open. Meaningful only for deferred pairs.
    pub fn open(&self) {
        let _ = self.local.send(TransportEvent::Open);
    }

    /// End the channel, delivering `Closed` to both ends.
    pub fn close(&self) {
        let _ = self.local.send(TransportEvent::Closed(None));
        let _ = self.outbound.send(TransportEvent::Closed(None));
    }

    /// Next transport event for this end, or `None` once the channel is
    /// gone. Events arrive in the order the remote end sent them.
    pub async fn next_event(&self) -> Option<TransportEvent> {
        self.inbox.lock().await.recv().await
    }
}

impl Transport for PipeEnd {
    fn send(&self, payload: Payload) -> Result<(), TransportError> {
        trace!(target: "tether::pipe", "pipe send: {}", payload);
        self.outbound
            .send(TransportEvent::Message(payload))
            .map_err(|_| TransportError::Closed)
    }

    fn signals_connect(&self) -> bool {
        self.deferred
    }
}

/// Pump transport events into a peer, one at a time, until the channel
/// closes. Spawn one per peer.
pub async fn drive(peer: Arc<Peer>, end: Arc<PipeEnd>) {
    while let Some(event) = end.next_event().await {
        let ended = matches!(event, TransportEvent::Closed(_));
        peer.handle_event(event).await;
        if ended {
            break;
        }
    }
}
