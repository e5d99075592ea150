//! Outbound event delivery
//!
//! Every connection owns one bounded queue drained by its socket writer
//! task. Delivery is non-blocking: senders never await, so events can be
//! fanned out while a room entry guard is held.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::models::{ConnectionId, ServerEvent};

/// Outbound queue depth per connection; a client that falls this far
/// behind starts losing events.
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 1000;

/// Sending half of a connection's outbound queue
pub type EventSender = mpsc::Sender<ServerEvent>;

/// Receiving half, drained by the socket writer task
pub type EventReceiver = mpsc::Receiver<ServerEvent>;

/// Create the outbound queue for a new connection
#[must_use]
pub fn outbound_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(OUTBOUND_CHANNEL_CAPACITY)
}

/// Non-blocking event delivery with drop accounting
///
/// A full queue means a slow client: the event is dropped and counted. A
/// closed queue means the connection is already tearing down; its own
/// cascade removes the stale membership, so the failure is ignored.
#[derive(Debug, Default)]
pub struct BroadcastRouter {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl BroadcastRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one event for one connection; returns whether it was accepted
    pub fn deliver(
        &self,
        connection_id: &ConnectionId,
        sender: &EventSender,
        event: &ServerEvent,
    ) -> bool {
        match sender.try_send(event.clone()) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    connection_id = %connection_id,
                    event_type = %event.event_type(),
                    "Outbound queue full, dropping event for slow client"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(
                    connection_id = %connection_id,
                    event_type = %event.event_type(),
                    "Outbound queue closed, connection is tearing down"
                );
                false
            }
        }
    }

    /// Events accepted into outbound queues since process start
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Events dropped because a queue was full
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
