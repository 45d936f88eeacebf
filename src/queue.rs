//! Bounded relay queues.
//!
//! One queue exists per active endpoint-direction plus one for EP0. Pushes
//! and pops are both non-blocking: `push` returns `false` instead of
//! blocking when the queue is full (the Relayer's own backoff policy
//! decides what to do about that), and `pop` returns `None` when empty.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

/// Fixed capacity enforced by the relay contract, see `spec §9` ("Queue
/// capacity of 16"). Every `RelayQueue` in this crate is this size.
pub const CAPACITY: usize = 16;

/// A bounded MPMC FIFO of `T`. Safe for concurrent use by any number of
/// producers and consumers; in practice there is exactly one consumer (the
/// owning Relayer's worker thread) and multiple producers (injectors, plus
/// the relay's own opposite-proxy read path feeding packets back in for
/// certain request/response flows).
pub struct RelayQueue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
}

impl<T> RelayQueue<T> {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(CAPACITY);
        RelayQueue { sender, receiver }
    }

    /// A cheaply cloneable handle producers can hold onto independently of
    /// the queue itself.
    pub fn producer(&self) -> QueueProducer<T> {
        QueueProducer {
            sender: self.sender.clone(),
        }
    }

    /// Non-blocking push. Returns `false` if the queue is full; the caller
    /// decides whether to retry with backoff or drop.
    pub fn push(&self, item: T) -> bool {
        match self.sender.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Non-blocking pop.
    pub fn pop(&self) -> Option<T> {
        match self.receiver.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Drains and drops every packet still queued. Called during teardown
    /// so that no packet is ever silently leaked, it is accounted for as
    /// "drained on stop" rather than lost.
    pub fn drain(&self) -> usize {
        let mut n = 0;
        while self.pop().is_some() {
            n += 1;
        }
        n
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<T> Default for RelayQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A producer-side handle to a [`RelayQueue`], held by injectors so they can
/// push synthetic traffic without touching the consumer side.
#[derive(Clone)]
pub struct QueueProducer<T> {
    sender: Sender<T>,
}

impl<T> QueueProducer<T> {
    pub fn push(&self, item: T) -> bool {
        match self.sender.try_send(item) {
            Ok(()) => true,
            Err(_) => false,
        }
    }
}
