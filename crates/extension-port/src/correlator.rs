//! Pending-request bookkeeping for one channel.
//!
//! ```text
//! request:  register(id) ──► emit [name, id, ..] ──► await receiver
//! terminal: settle(id)   ──► sender fires once   ──► id remembered as finished
//! timeout:  expire(id)   ──► entry dropped       ──► later terminal is Late
//! close:    close_all()  ──► every sender gets TransportClosed
//! ```
//!
//! The correlator does no I/O. The channel owns it and feeds it terminal
//! messages in arrival order.

use crate::PortError;
use port_protocol_types::{MessageName, Outcome, RequestId};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Number of finished ids remembered for duplicate/late detection.
const DEFAULT_FINISHED_CAPACITY: usize = 1024;

/// What the awaiting caller receives.
pub type Settlement = Result<Vec<Value>, PortError>;

/// A request waiting for its terminal message.
#[derive(Debug)]
pub struct PendingRequest {
    /// Request identifier.
    pub id: RequestId,
    /// Name the request was sent under.
    pub name: MessageName,
    /// When the request was registered.
    pub created_at: Instant,
    sender: oneshot::Sender<Settlement>,
}

impl PendingRequest {
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// How a finished id stopped being pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finish {
    Settled,
    Expired,
    Closed,
}

/// Result of feeding a terminal message to the correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleResult {
    /// The waiting caller received the outcome.
    Delivered,
    /// The entry settled but the caller had stopped waiting.
    CallerGone,
    /// The id had already settled once.
    Duplicate,
    /// The id had timed out or its channel closed.
    Late,
    /// The id was never issued here (or is too old to remember).
    Unknown,
}

/// Pending requests of one channel.
#[derive(Debug)]
pub struct Correlator {
    pending: HashMap<RequestId, PendingRequest>,
    finished: HashMap<RequestId, Finish>,
    finished_order: VecDeque<RequestId>,
    finished_capacity: usize,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new(DEFAULT_FINISHED_CAPACITY)
    }
}

impl Correlator {
    pub fn new(finished_capacity: usize) -> Self {
        Self {
            pending: HashMap::new(),
            finished: HashMap::new(),
            finished_order: VecDeque::new(),
            finished_capacity: finished_capacity.max(1),
        }
    }

    /// Register a new pending request and return the receiver to await.
    pub fn register(
        &mut self,
        id: RequestId,
        name: MessageName,
    ) -> Result<oneshot::Receiver<Settlement>, PortError> {
        if self.pending.contains_key(&id) || self.finished.contains_key(&id) {
            return Err(PortError::ProtocolViolation(format!(
                "request id {} is already in use",
                id
            )));
        }

        let (sender, receiver) = oneshot::channel();
        self.pending.insert(
            id.clone(),
            PendingRequest {
                id,
                name,
                created_at: Instant::now(),
                sender,
            },
        );
        Ok(receiver)
    }

    /// Feed a terminal message. Only the first one per id has an effect.
    pub fn settle(&mut self, id: &RequestId, outcome: Outcome) -> SettleResult {
        let Some(pending) = self.pending.remove(id) else {
            return match self.finished.get(id) {
                Some(Finish::Settled) => SettleResult::Duplicate,
                Some(Finish::Expired) | Some(Finish::Closed) => SettleResult::Late,
                None => SettleResult::Unknown,
            };
        };

        self.remember(id.clone(), Finish::Settled);

        let settlement = match outcome {
            Outcome::Success(result) => Ok(result),
            Outcome::Error(payload) => Err(PortError::Remote(payload)),
        };

        match pending.sender.send(settlement) {
            Ok(()) => SettleResult::Delivered,
            Err(_) => SettleResult::CallerGone,
        }
    }

    /// Drop a pending request whose timeout elapsed.
    ///
    /// Returns false when the request already settled, in which case the
    /// caller's receiver holds the outcome.
    pub fn expire(&mut self, id: &RequestId) -> bool {
        match self.pending.remove(id) {
            Some(_) => {
                self.remember(id.clone(), Finish::Expired);
                true
            }
            None => false,
        }
    }

    /// Reject every pending request with `TransportClosed`.
    pub fn close_all(&mut self) -> usize {
        let drained: Vec<PendingRequest> = self.pending.drain().map(|(_, p)| p).collect();
        let count = drained.len();
        for pending in drained {
            self.remember(pending.id.clone(), Finish::Closed);
            let _ = pending.sender.send(Err(PortError::TransportClosed));
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.pending.contains_key(id)
    }

    fn remember(&mut self, id: RequestId, finish: Finish) {
        if self.finished.insert(id.clone(), finish).is_none() {
            self.finished_order.push_back(id);
        }
        while self.finished_order.len() > self.finished_capacity {
            if let Some(oldest) = self.finished_order.pop_front() {
                self.finished.remove(&oldest);
            }
        }
    }
}
