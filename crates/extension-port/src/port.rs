//! Request/response over a channel.

use crate::channel::{Channel, ChannelId, Disposer};
use crate::{PortError, PortResult, Pipe};
use port_protocol_types::{
    Envelope, ErrorPayload, Message, MessageKind, MessageName, Outcome, RequestId,
};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout policy applied to every request issued through a port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestPolicy {
    /// `None` waits until a terminal message arrives or the channel closes.
    pub timeout: Option<Duration>,
}

impl RequestPolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// A channel plus request correlation.
#[derive(Clone, Debug)]
pub struct Port {
    channel: Channel,
    policy: RequestPolicy,
}

impl Port {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            policy: RequestPolicy::default(),
        }
    }

    /// Open a channel over `pipe` and wrap it.
    pub fn open(pipe: Pipe, label: impl Into<String>) -> Self {
        Self::new(Channel::open(pipe, label))
    }

    pub fn with_policy(mut self, policy: RequestPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RequestPolicy {
        self.policy
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn id(&self) -> ChannelId {
        self.channel.id()
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    /// Send a request and wait for its terminal message.
    pub async fn request(&self, name: MessageName, args: Vec<Value>) -> PortResult<Vec<Value>> {
        self.send_request(name, args, self.policy.timeout).await
    }

    /// Like `request`, overriding the port's timeout for this call.
    pub async fn request_with_timeout(
        &self,
        name: MessageName,
        args: Vec<Value>,
        timeout: Duration,
    ) -> PortResult<Vec<Value>> {
        self.send_request(name, args, Some(timeout)).await
    }

    async fn send_request(
        &self,
        name: MessageName,
        args: Vec<Value>,
        timeout: Option<Duration>,
    ) -> PortResult<Vec<Value>> {
        if name.kind() != MessageKind::Request {
            return Err(PortError::ProtocolViolation(format!(
                "{} is an event and cannot be requested",
                name
            )));
        }

        let id = RequestId::new();
        let mut rx = self.channel.register_pending(id.clone(), name)?;

        debug!(channel = %self.id(), name = %name, request_id = %id, "Sending request");
        let sent = self.channel.emit(Message::Request {
            name,
            id: id.clone(),
            args,
        });
        if !sent {
            self.channel.expire_pending(&id);
            warn!(channel = %self.id(), name = %name, request_id = %id, "Request could not be written");
            return Err(PortError::TransportClosed);
        }

        let settlement = match timeout {
            None => rx.await,
            Some(after) => match tokio::time::timeout(after, &mut rx).await {
                Ok(settlement) => settlement,
                Err(_) => {
                    if self.channel.expire_pending(&id) {
                        warn!(
                            channel = %self.id(),
                            name = %name,
                            request_id = %id,
                            timeout_ms = after.as_millis() as u64,
                            "Request timed out"
                        );
                        return Err(PortError::RequestTimeout { name, after });
                    }
                    // Settled between the timer firing and the expiry.
                    rx.await
                }
            },
        };

        settlement.unwrap_or(Err(PortError::TransportClosed))
    }

    /// Fire-and-forget event.
    pub fn emit_event(&self, name: MessageName, args: Vec<Value>) {
        self.channel.emit(Message::Event { name, args });
    }

    /// Answer a request.
    pub fn respond(&self, id: RequestId, outcome: Outcome) {
        self.channel.emit(Message::Response { id, outcome });
    }

    pub fn success(&self, id: RequestId, result: Vec<Value>) {
        self.respond(id, Outcome::Success(result));
    }

    pub fn error(&self, id: RequestId, payload: impl Into<ErrorPayload>) {
        self.respond(id, Outcome::Error(payload.into()));
    }

    /// Raw handler registration, see `Channel::on`.
    pub fn on<F, Fut>(&self, name: MessageName, handler: F) -> Disposer
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.channel.on(name, handler)
    }

    /// Register a request handler whose result becomes the terminal message.
    ///
    /// `Ok(result)` is sent as `SUCCESS`, `Err(payload)` as `ERROR`, both
    /// under the request's id. Events with this name are ignored.
    pub fn handle<F, Fut>(&self, name: MessageName, handler: F) -> Disposer
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Value>, ErrorPayload>> + Send + 'static,
    {
        let weak = self.channel.downgrade();
        self.channel.on(name, move |envelope: Envelope| {
            let id = envelope.id.clone();
            let work = id.is_some().then(|| handler(envelope));
            let weak = weak.clone();
            async move {
                let (Some(id), Some(work)) = (id, work) else {
                    debug!(name = %name, "Ignoring event sent to a request handler");
                    return;
                };
                let outcome = match work.await {
                    Ok(result) => Outcome::Success(result),
                    Err(payload) => Outcome::Error(payload),
                };
                match weak.upgrade() {
                    Some(channel) => {
                        channel.emit(Message::Response { id, outcome });
                    }
                    None => debug!(request_id = %id, "Channel gone before handler finished"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Diagnostic;
    use port_protocol_types::ErrorKind;
    use serde_json::json;

    fn connected() -> (Port, Port) {
        let (a, b) = Pipe::pair();
        (Port::open(a, "caller"), Port::open(b, "callee"))
    }

    #[tokio::test]
    async fn test_request_resolves_on_success() {
        let (caller, callee) = connected();
        callee.handle(MessageName::SecretDecrypt, |envelope| async move {
            let resource: String = envelope.arg(0).map_err(ErrorPayload::from)?;
            Ok(vec![json!(format!("plain:{resource}"))])
        });

        let result = caller
            .request(MessageName::SecretDecrypt, vec![json!("r-1")])
            .await
            .unwrap();
        assert_eq!(result, vec![json!("plain:r-1")]);
    }

    #[tokio::test]
    async fn test_request_rejects_on_error() {
        let (caller, callee) = connected();
        callee.handle(MessageName::AuthVerify, |_| async {
            Err(ErrorPayload::new(ErrorKind::AuthChallengeFailed, "proof mismatch"))
        });

        let error = caller
            .request(MessageName::AuthVerify, vec![])
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::AuthChallengeFailed);
    }

    #[tokio::test]
    async fn test_events_cannot_be_requested() {
        let (caller, _callee) = connected();
        let error = caller
            .request(MessageName::AuthLoginSuccess, vec![])
            .await
            .unwrap_err();
        assert!(matches!(error, PortError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_unrelated_messages_do_not_settle() {
        let (a, b) = Pipe::pair();
        let caller = Port::open(a, "caller");
        let (peer_tx, mut peer_rx) = (b.outbound, b.inbound);

        let pending = tokio::spawn({
            let caller = caller.clone();
            async move { caller.request(MessageName::FormFill, vec![]).await }
        });

        let request = Message::from_wire(peer_rx.recv().await.unwrap()).unwrap();
        let Message::Request { id, .. } = request else {
            panic!("expected a request");
        };

        peer_tx.send(json!(["auth.login-processing"])).unwrap();
        peer_tx.send(json!(["some-other-id", "SUCCESS"])).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        peer_tx.send(json!([id.as_str(), "SUCCESS", "done"])).unwrap();
        assert_eq!(pending.await.unwrap().unwrap(), vec![json!("done")]);
    }

    #[tokio::test]
    async fn test_duplicate_terminal_is_reported_only() {
        let (a, b) = Pipe::pair();
        let caller = Port::open(a, "caller");
        let mut diagnostics = caller.channel().diagnostics();
        let (peer_tx, mut peer_rx) = (b.outbound, b.inbound);

        let pending = tokio::spawn({
            let caller = caller.clone();
            async move { caller.request(MessageName::FormFill, vec![]).await }
        });

        let Message::Request { id, .. } = Message::from_wire(peer_rx.recv().await.unwrap()).unwrap()
        else {
            panic!("expected a request");
        };

        peer_tx.send(json!([id.as_str(), "SUCCESS", 1])).unwrap();
        peer_tx
            .send(json!([id.as_str(), "ERROR", {"kind": "internal", "message": "again"}]))
            .unwrap();

        assert_eq!(pending.await.unwrap().unwrap(), vec![json!(1)]);
        assert_eq!(
            diagnostics.recv().await.unwrap(),
            Diagnostic::DuplicateTerminal { id }
        );
    }

    #[tokio::test]
    async fn test_unknown_terminal_is_reported() {
        let (a, b) = Pipe::pair();
        let caller = Port::open(a, "caller");
        let mut diagnostics = caller.channel().diagnostics();

        b.outbound.send(json!(["never-issued", "SUCCESS"])).unwrap();

        assert_eq!(
            diagnostics.recv().await.unwrap(),
            Diagnostic::UnknownTerminal {
                id: RequestId::from("never-issued")
            }
        );
        assert_eq!(caller.channel().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_then_late_terminal_is_noop() {
        let (a, b) = Pipe::pair();
        let caller = Port::open(a, "caller").with_policy(RequestPolicy::with_timeout(
            Duration::from_millis(50),
        ));
        let mut diagnostics = caller.channel().diagnostics();
        let (peer_tx, mut peer_rx) = (b.outbound, b.inbound);

        let error = caller
            .request(MessageName::FormFill, vec![])
            .await
            .unwrap_err();
        assert!(matches!(error, PortError::RequestTimeout { .. }));
        assert_eq!(caller.channel().pending_count(), 0);

        let Message::Request { id, .. } = Message::from_wire(peer_rx.recv().await.unwrap()).unwrap()
        else {
            panic!("expected a request");
        };
        peer_tx.send(json!([id.as_str(), "SUCCESS"])).unwrap();

        assert_eq!(
            diagnostics.recv().await.unwrap(),
            Diagnostic::LateTerminal { id }
        );
    }

    #[tokio::test]
    async fn test_per_call_timeout_overrides_policy() {
        let (caller, callee) = connected();
        // Listens but never answers.
        callee.on(MessageName::TagsFindAll, |_| async {});

        let error = caller
            .request_with_timeout(MessageName::TagsFindAll, vec![], Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::RequestTimeout);
    }

    #[tokio::test]
    async fn test_unhandled_request_fails_fast() {
        let (caller, _callee) = connected();
        let error = caller
            .request(MessageName::ThemesFindAll, vec![])
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NoHandler);
    }

    #[tokio::test]
    async fn test_unwritable_request_fails_with_transport_closed() {
        let (outbound, dead) = tokio::sync::mpsc::unbounded_channel();
        drop(dead);
        let (_inbound_tx, inbound) = tokio::sync::mpsc::unbounded_channel();
        let caller = Port::open(Pipe::from_parts(outbound, inbound), "caller");

        let result = tokio::time::timeout(
            Duration::from_millis(500),
            caller.request(MessageName::FormFill, vec![]),
        )
        .await
        .expect("request never settled");

        assert!(matches!(result, Err(PortError::TransportClosed)));
        assert_eq!(caller.channel().pending_count(), 0);
        assert!(caller.is_closed());
    }

    #[tokio::test]
    async fn test_close_rejects_pending_with_transport_closed() {
        let (a, b) = Pipe::pair();
        let caller = Port::open(a, "caller");

        let pending = tokio::spawn({
            let caller = caller.clone();
            async move { caller.request(MessageName::FormFill, vec![]).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(b);

        assert!(matches!(
            pending.await.unwrap(),
            Err(PortError::TransportClosed)
        ));
        assert!(matches!(
            caller.request(MessageName::FormFill, vec![]).await,
            Err(PortError::TransportClosed)
        ));
    }

    #[tokio::test]
    async fn test_nested_request_inside_handler() {
        // A handler on the callee asks the caller something before answering.
        let (caller, callee) = connected();
        caller.handle(MessageName::TabsQueryActive, |_| async {
            Ok(vec![json!({"id": 7, "url": "https://example.com"})])
        });

        let callee_port = callee.clone();
        callee.handle(MessageName::FormFill, move |_| {
            let port = callee_port.clone();
            async move {
                let tab = port
                    .request(MessageName::TabsQueryActive, vec![])
                    .await
                    .map_err(ErrorPayload::from)?;
                Ok(tab)
            }
        });

        let result = caller.request(MessageName::FormFill, vec![]).await.unwrap();
        assert_eq!(result[0]["id"], 7);
    }
}
