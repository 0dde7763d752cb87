//! Event publishing/subscription abstraction.
//!
//! The bus fans committed envelopes out to whoever consumes them: the
//! document, balance and stock read models and the audit log. It carries
//! messages; it does not keep them.
//!
//! ## Store first, publish second
//!
//! A command's events are appended to the event store before anything is
//! published. If publishing fails the events are still committed and the
//! store remains the record a consumer can rebuild from
//! (`ReadModels::rebuild_tenant` replays a tenant's history in order).
//!
//! ## Delivery guarantees
//!
//! - **At-least-once**: a message may arrive more than once, for example
//!   when a caller republishes after a partial failure.
//! - **Ordered per publisher only**: one publisher's messages arrive in the
//!   order sent. Concurrent publishers interleave.
//! - **No persistence**: a subscriber only sees messages published after it
//!   subscribed.
//!
//! Consumers therefore have to be idempotent. The read models track the
//! last applied sequence number per stream and skip anything at or behind
//! it, so a duplicate is a no-op rather than a double count.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription receiving every message published after it was created.
///
/// Every subscription gets its own copy of each message (broadcast). Create
/// it before the first publish you care about; earlier messages are gone.
///
/// ## Consuming
///
/// ```ignore
/// let sub = bus.subscribe();
/// loop {
///     match sub.recv_timeout(Duration::from_millis(250)) {
///         Ok(envelope) => read_models.apply_envelope(&envelope)?,
///         Err(RecvTimeoutError::Timeout) => continue, // check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break, // bus dropped
///     }
/// }
/// ```
///
/// A subscription is meant for one consumer thread. Fan work out behind it
/// if more threads need the messages; the projection worker owns one and
/// drains it on its own thread.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Take the next message if one is already queued.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Transport-agnostic pub/sub with broadcast semantics.
///
/// ## Where it sits
///
/// ```text
/// Lifecycle / CommandDispatcher
///     -> EventStore::append          (commit, sequence numbers assigned)
///     -> EventBus::publish           (one envelope per stored event)
///         -> Subscription            (one per consumer)
///             -> ReadModels / AuditLog
/// ```
///
/// The in-memory implementation backs tests and single-process use. Another
/// transport (a broker, a database notification channel) only has to honour
/// the same contract: broadcast to every live subscription, at least once.
///
/// ## Errors
///
/// `publish` may fail, e.g. when every subscriber has gone away or a remote
/// transport is unreachable. The dispatcher reports the failure but the
/// append has already happened, so publishing the same envelopes again is
/// safe and consumers dedupe them.
///
/// ## Threads
///
/// Implementations are `Send + Sync`; any number of threads may publish at
/// once.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    /// Deliver `message` to every current subscription.
    fn publish(&self, message: M) -> Result<(), Self::Error>;

    /// Open a subscription that sees messages published from now on.
    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
