//! Named-event channel over a raw pipe.
//!
//! A `Channel` owns one pipe. It runs a dispatch task that reads inbound
//! messages in arrival order and:
//!
//! - routes terminal messages to the channel's correlator,
//! - calls every handler registered for the message name, in registration
//!   order,
//! - answers requests nobody listens for with a `no_handler` error.
//!
//! A handler is a closure returning a future. The closure itself runs inline
//! on the dispatch task, so anything it does before its first `.await` happens
//! in arrival order; the returned future runs as its own task. A handler that
//! awaits a nested request therefore never blocks delivery of that request's
//! terminal message.

use crate::correlator::{Correlator, SettleResult, Settlement};
use crate::{Diagnostic, PortError};
use port_protocol_types::{
    Envelope, ErrorKind, ErrorPayload, Message, MessageName, Outcome, RequestId,
};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, trace, warn};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Capacity of the per-channel diagnostic stream.
const DIAGNOSTIC_CAPACITY: usize = 256;

/// Future returned by a handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

type HandlerFn = Arc<dyn Fn(Envelope) -> HandlerFuture + Send + Sync>;

/// Process-unique identity of a channel (and therefore of its pipe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

struct Inner {
    id: ChannelId,
    label: String,
    outbound: Mutex<Option<mpsc::UnboundedSender<Value>>>,
    handlers: Mutex<HashMap<MessageName, Vec<(u64, HandlerFn)>>>,
    next_handler_id: AtomicU64,
    correlator: Mutex<Correlator>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    diagnostics: broadcast::Sender<Diagnostic>,
}

/// Bidirectional named-message channel.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

/// Non-owning reference to a channel.
#[derive(Clone)]
pub struct WeakChannel {
    inner: Weak<Inner>,
}

impl WeakChannel {
    pub fn upgrade(&self) -> Option<Channel> {
        self.inner.upgrade().map(|inner| Channel { inner })
    }
}

/// Removes one handler registration.
///
/// Dropping a disposer leaves the handler registered; call `dispose`.
pub struct Disposer {
    channel: WeakChannel,
    name: MessageName,
    handler_id: u64,
}

impl Disposer {
    /// Unregister the handler. Returns false if it was already gone.
    pub fn dispose(self) -> bool {
        let Some(channel) = self.channel.upgrade() else {
            return false;
        };
        let mut handlers = lock(&channel.inner.handlers);
        let Some(list) = handlers.get_mut(&self.name) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != self.handler_id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(&self.name);
        }
        removed
    }
}

impl Channel {
    /// Take ownership of a pipe and start dispatching its inbound side.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(pipe: crate::Pipe, label: impl Into<String>) -> Self {
        let crate::Pipe { outbound, inbound } = pipe;
        let (closed_tx, closed_rx) = watch::channel(false);
        let (diagnostics, _) = broadcast::channel(DIAGNOSTIC_CAPACITY);

        let inner = Arc::new(Inner {
            id: ChannelId(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed)),
            label: label.into(),
            outbound: Mutex::new(Some(outbound)),
            handlers: Mutex::new(HashMap::new()),
            next_handler_id: AtomicU64::new(1),
            correlator: Mutex::new(Correlator::default()),
            closed: AtomicBool::new(false),
            closed_tx,
            diagnostics,
        });

        let channel = Channel { inner };
        debug!(channel = %channel.id(), label = %channel.label(), "Channel opened");
        tokio::spawn(dispatch_loop(channel.clone(), inbound, closed_rx));
        channel
    }

    pub fn id(&self) -> ChannelId {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn downgrade(&self) -> WeakChannel {
        WeakChannel {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Resolves once the channel is closed. Does not keep the channel alive.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.inner.closed_tx.subscribe();
        async move {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    /// Subscribe to protocol diagnostics.
    pub fn diagnostics(&self) -> broadcast::Receiver<Diagnostic> {
        self.inner.diagnostics.subscribe()
    }

    /// Register a handler for `name`. Handlers for one name run in
    /// registration order.
    pub fn on<F, Fut>(&self, name: MessageName, handler: F) -> Disposer
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler_id = self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed);
        let boxed: HandlerFn = Arc::new(move |envelope| Box::pin(handler(envelope)));
        lock(&self.inner.handlers)
            .entry(name)
            .or_default()
            .push((handler_id, boxed));

        trace!(channel = %self.id(), name = %name, handler_id, "Handler registered");
        Disposer {
            channel: self.downgrade(),
            name,
            handler_id,
        }
    }

    /// Number of handlers currently registered for `name`.
    pub fn handler_count(&self, name: MessageName) -> usize {
        lock(&self.inner.handlers)
            .get(&name)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Write a message to the pipe. Never blocks.
    ///
    /// Returns false when the message was dropped. A pipe whose outbound
    /// half is gone closes the channel.
    pub fn emit(&self, message: Message) -> bool {
        let sent = match lock(&self.inner.outbound).as_ref() {
            Some(tx) => Some(tx.send(message.to_wire()).is_ok()),
            None => None,
        };

        match sent {
            Some(true) => {
                trace!(channel = %self.id(), message = %message.label(), "Emitted");
                true
            }
            Some(false) => {
                let label = message.label();
                debug!(channel = %self.id(), message = %label, "Outbound pipe gone, dropping message");
                self.publish(Diagnostic::DroppedEmit { message: label });
                self.mark_closed("outbound pipe ended");
                false
            }
            None => {
                let label = message.label();
                debug!(channel = %self.id(), message = %label, "Dropping message on closed channel");
                self.publish(Diagnostic::DroppedEmit { message: label });
                false
            }
        }
    }

    /// Close our side: the peer sees end of stream and every pending request
    /// fails with `TransportClosed`.
    pub fn close(&self) {
        lock(&self.inner.outbound).take();
        self.mark_closed("closed locally");
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.inner.correlator).pending_count()
    }

    pub(crate) fn register_pending(
        &self,
        id: RequestId,
        name: MessageName,
    ) -> Result<oneshot::Receiver<Settlement>, PortError> {
        let mut correlator = lock(&self.inner.correlator);
        if self.is_closed() {
            return Err(PortError::TransportClosed);
        }
        correlator.register(id, name)
    }

    pub(crate) fn expire_pending(&self, id: &RequestId) -> bool {
        let expired = lock(&self.inner.correlator).expire(id);
        expired
    }

    fn publish(&self, diagnostic: Diagnostic) {
        // No subscribers is the normal case.
        let _ = self.inner.diagnostics.send(diagnostic);
    }

    fn mark_closed(&self, reason: &str) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let rejected = lock(&self.inner.correlator).close_all();
        lock(&self.inner.handlers).clear();
        // Dropping the sender ends the pipe for the peer.
        lock(&self.inner.outbound).take();
        self.inner.closed_tx.send_replace(true);

        debug!(
            channel = %self.id(),
            label = %self.label(),
            reason,
            rejected,
            "Channel closed"
        );
    }

    fn dispatch(&self, raw: Value) {
        let message = match Message::from_wire(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(channel = %self.id(), error = %e, "Dropping malformed message");
                self.publish(Diagnostic::MalformedMessage {
                    reason: e.to_string(),
                });
                return;
            }
        };

        match message {
            Message::Response { id, outcome } => self.settle(id, outcome),
            Message::Request { name, id, args } => self.deliver(Envelope {
                name,
                id: Some(id),
                args,
            }),
            Message::Event { name, args } => self.deliver(Envelope {
                name,
                id: None,
                args,
            }),
        }
    }

    fn settle(&self, id: RequestId, outcome: Outcome) {
        let status = outcome.status();
        let result = lock(&self.inner.correlator).settle(&id, outcome);

        match result {
            SettleResult::Delivered => {
                trace!(channel = %self.id(), request_id = %id, status = status.as_str(), "Request settled");
            }
            SettleResult::CallerGone => {
                debug!(channel = %self.id(), request_id = %id, "Request settled after caller stopped waiting");
            }
            SettleResult::Duplicate => {
                warn!(channel = %self.id(), request_id = %id, "Duplicate terminal message ignored");
                self.publish(Diagnostic::DuplicateTerminal { id });
            }
            SettleResult::Late => {
                debug!(channel = %self.id(), request_id = %id, "Late terminal message ignored");
                self.publish(Diagnostic::LateTerminal { id });
            }
            SettleResult::Unknown => {
                warn!(channel = %self.id(), request_id = %id, "Terminal message for unknown request ignored");
                self.publish(Diagnostic::UnknownTerminal { id });
            }
        }
    }

    fn deliver(&self, envelope: Envelope) {
        let handlers: Vec<HandlerFn> = lock(&self.inner.handlers)
            .get(&envelope.name)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            match envelope.id {
                Some(id) => {
                    warn!(channel = %self.id(), name = %envelope.name, request_id = %id, "No handler for request");
                    self.publish(Diagnostic::UnhandledRequest {
                        name: envelope.name,
                        id: id.clone(),
                    });
                    self.emit(Message::error(
                        id,
                        ErrorPayload::new(
                            ErrorKind::NoHandler,
                            format!("No handler for {}", envelope.name),
                        ),
                    ));
                }
                None => {
                    debug!(channel = %self.id(), name = %envelope.name, "No listener for event");
                }
            }
            return;
        }

        for handler in handlers {
            tokio::spawn(handler(envelope.clone()));
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn dispatch_loop(
    channel: Channel,
    mut inbound: mpsc::UnboundedReceiver<Value>,
    mut closed_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            next = inbound.recv() => match next {
                Some(raw) => channel.dispatch(raw),
                None => break,
            },
            changed = closed_rx.changed() => {
                if changed.is_err() || *closed_rx.borrow() {
                    break;
                }
            }
        }
    }
    channel.mark_closed("pipe ended");
}

/// Handler panics never run while a lock is held, so poisoning only means a
/// bug elsewhere; keep serving with the inner data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
