use dashmap::DashMap;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::debug;

use crate::codec::{self, Encoding, Payload};
use crate::envelope::{Envelope, Outcome};
use crate::error::{PeerError, RpcError};
use crate::events::{EventDispatcher, Subscription, ERROR_EVENT};
use crate::ids::{RequestId, RequestIdAllocator};
use crate::transport::{Transport, TransportError, TransportEvent};
use crate::MethodDispatcher;

/// Event emitted when the transport reports close. The peer keeps its
/// pending calls; rejecting them is the embedder's policy.
pub const TRANSPORT_CLOSED_EVENT: &str = "transportClosed";

/// Event emitted when the peer enters the connected state. Transports
/// without a connect signal are born connected and never emit it; check
/// [`Peer::is_connected`] first.
pub const CONNECTED_EVENT: &str = "connected";

struct SendQueue {
    connected: bool,
    buffered: VecDeque<Payload>,
}

/// One endpoint of the RPC channel.
///
/// Symmetric: both the host and the script side run the same peer. It owns
/// request/response correlation, notification fan-out, and the send queue
/// that holds outbound traffic until the transport reports connectivity.
pub struct Peer {
    transport: Arc<dyn Transport>,
    events: EventDispatcher,
    pending: DashMap<RequestId, oneshot::Sender<Result<Value, RpcError>>>,
    ids: RequestIdAllocator,
    queue: Mutex<SendQueue>,
    send_encoding: RwLock<Encoding>,
    log_wire: AtomicBool,
    dispatcher: RwLock<Option<Arc<dyn MethodDispatcher>>>,
}

impl Peer {
    /// Bind a peer to a transport. Transports without a connect signal are
    /// treated as open now; otherwise the peer buffers until `Open` arrives.
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        let connected = !transport.signals_connect();
        Arc::new(Peer {
            transport,
            events: EventDispatcher::new(),
            pending: DashMap::new(),
            ids: RequestIdAllocator::new(),
            queue: Mutex::new(SendQueue {
                connected,
                buffered: VecDeque::new(),
            }),
            send_encoding: RwLock::new(Encoding::default()),
            log_wire: AtomicBool::new(false),
            dispatcher: RwLock::new(None),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.lock_queue().connected
    }

    /// Number of calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    pub fn send_encoding(&self) -> Encoding {
        *self.send_encoding.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_send_encoding(&self, encoding: Encoding) {
        *self.send_encoding.write().unwrap_or_else(|e| e.into_inner()) = encoding;
    }

    /// Toggle the one-line wire log per send/receive.
    pub fn set_wire_logging(&self, enabled: bool) {
        self.log_wire.store(enabled, Ordering::Relaxed);
    }

    /// Route inbound requests to `dispatcher`. Without one, every inbound
    /// request is answered MethodNotFound.
    pub fn set_dispatcher(&self, dispatcher: Arc<dyn MethodDispatcher>) {
        *self.dispatcher.write().unwrap_or_else(|e| e.into_inner()) = Some(dispatcher);
    }

    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.events.on(event, handler)
    }

    pub fn once<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.events.once(event, handler)
    }

    pub fn off(&self, event: &str, subscription: Subscription) -> bool {
        self.events.off(event, subscription)
    }

    /// Emit a local event to this peer's subscribers. Inbound notifications
    /// go through the same fan-out.
    pub fn emit(&self, event: &str, payload: &Value) {
        self.events.emit(event, payload);
    }

    /// Issue a request and wait for the matching response.
    ///
    /// `params`, when present, must be an array or an object; anything else
    /// fails before the request touches the pending table or the transport.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, PeerError> {
        check_params(params.as_ref())?;

        let id = self.ids.allocate();
        let payload = self.encode(&Envelope::request(id, method, params))?;

        let (resolver, settled) = oneshot::channel();
        self.pending.insert(id, resolver);

        if let Err(err) = self.enqueue(payload) {
            // Never reached the wire, so no response can arrive.
            self.pending.remove(&id);
            return Err(err.into());
        }

        match settled.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(PeerError::Remote(error)),
            Err(_) => Err(PeerError::PeerDropped),
        }
    }

    /// Send a one-way notification. Same param check as `call`; no id, no
    /// pending entry, no reply.
    pub fn notify(&self, method: &str, params: Option<Value>) -> Result<(), PeerError> {
        check_params(params.as_ref())?;
        let payload = self.encode(&Envelope::notification(method, params))?;
        self.enqueue(payload)?;
        Ok(())
    }

    /// Entry point for the transport driver. Events must be delivered one
    /// at a time: this future is awaited to completion per event.
    pub async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Message(payload) => self.process_message(payload).await,
            TransportEvent::Open => self.handle_open(),
            TransportEvent::Closed(reason) => self.handle_closed(reason),
            TransportEvent::Error(err) => self.emit_error(format!("transport error: {}", err)),
        }
    }

    /// Decode and route one inbound payload.
    pub async fn process_message(&self, payload: Payload) {
        if self.log_wire.load(Ordering::Relaxed) {
            debug!(target: "tether::wire", "<-- {}", payload);
        }

        let envelope = match codec::decode(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.emit_error(format!("failed to decode inbound payload: {}", err));
                return;
            }
        };

        match envelope {
            Envelope::Response { id, outcome } => match self.pending.remove(&id) {
                Some((_, resolver)) => {
                    let result = match outcome {
                        Outcome::Success(value) => Ok(value),
                        Outcome::Error(error) => Err(error),
                    };
                    // The caller may have dropped its future; resolution
                    // into a closed receiver is discarded.
                    let _ = resolver.send(result);
                }
                None => {
                    self.emit_error(format!("Response with id:{} has no pending request", id))
                }
            },
            Envelope::Notification { method, params } => {
                self.events.emit(&method, &params.unwrap_or(Value::Null));
            }
            Envelope::Request { id, method, params } => {
                let outcome = self.dispatch_request(&method, params).await;
                self.respond(id, &method, outcome);
            }
        }
    }

    async fn dispatch_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, RpcError> {
        let dispatcher = self
            .dispatcher
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match dispatcher {
            Some(dispatcher) => dispatcher.dispatch(method, params).await,
            None => Err(RpcError::method_not_found(format!(
                "no handler for method {}",
                method
            ))),
        }
    }

    fn respond(&self, id: RequestId, method: &str, outcome: Result<Value, RpcError>) {
        let envelope = Envelope::response(id, Outcome::from(outcome));
        match self.encode(&envelope) {
            Ok(payload) => {
                if let Err(err) = self.enqueue(payload) {
                    self.emit_error(format!("failed to send response for {}: {}", method, err));
                }
            }
            Err(err) => {
                self.emit_error(format!("failed to encode response for {}: {}", method, err))
            }
        }
    }

    fn handle_open(&self) {
        let flush_failure = {
            let mut queue = self.lock_queue();
            queue.connected = true;
            self.drain_locked(&mut queue).err()
        };
        if let Some(err) = flush_failure {
            self.emit_error(format!("failed to flush send queue: {}", err));
        }
        self.events.emit(CONNECTED_EVENT, &Value::Null);
    }

    fn handle_closed(&self, reason: Option<TransportError>) {
        self.lock_queue().connected = false;
        let payload = match reason {
            Some(err) => Value::String(err.to_string()),
            None => Value::Null,
        };
        self.events.emit(TRANSPORT_CLOSED_EVENT, &payload);
    }

    fn encode(&self, envelope: &Envelope) -> Result<Payload, PeerError> {
        Ok(codec::encode(envelope, self.send_encoding())?)
    }

    /// Hand a payload to the transport, or buffer it while disconnected.
    /// The lock spans the connected check and the send so a flush cannot
    /// interleave with a fresh send.
    fn enqueue(&self, payload: Payload) -> Result<(), TransportError> {
        let mut queue = self.lock_queue();
        if !queue.connected {
            queue.buffered.push_back(payload);
            return Ok(());
        }
        self.drain_locked(&mut queue)?;
        self.send_now(&payload)
    }

    fn drain_locked(&self, queue: &mut SendQueue) -> Result<(), TransportError> {
        while let Some(payload) = queue.buffered.front() {
            self.send_now(payload)?;
            queue.buffered.pop_front();
        }
        Ok(())
    }

    fn send_now(&self, payload: &Payload) -> Result<(), TransportError> {
        if self.log_wire.load(Ordering::Relaxed) {
            debug!(target: "tether::wire", "--> {}", payload);
        }
        self.transport.send(payload.clone())
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, SendQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit_error(&self, message: String) {
        tracing::warn!("{}", message);
        self.events.emit(ERROR_EVENT, &Value::String(message));
    }
}

fn check_params(params: Option<&Value>) -> Result<(), PeerError> {
    match params {
        None | Some(Value::Array(_)) | Some(Value::Object(_)) => Ok(()),
        Some(other) => Err(PeerError::InvalidParams(value_kind(other))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
