//! Event router.
//!
//! Decodes raw socket frames into [`DomainEvent`]s and hands them to
//! subscribers synchronously, in receipt order. Frames that fail to decode
//! are logged and dropped; they never reach a subscriber.

use ridesync_proto::{DecodeError, DomainEvent};
use tracing::{trace, warn};

/// A decoded frame, stamped with its position in the receive order.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    /// Monotonic receipt number assigned by the router.
    pub receipt: u64,
    /// Backend sequence number, if the frame carried one.
    pub seq: Option<u64>,
    /// The event.
    pub event: DomainEvent,
}

/// Receiver of routed events.
pub trait EventSink: Send {
    /// Handle one event. Called in receipt order.
    fn on_event(&mut self, routed: &Routed);
}

impl<F> EventSink for F
where
    F: FnMut(&Routed) + Send,
{
    fn on_event(&mut self, routed: &Routed) {
        self(routed);
    }
}

/// Identifies a subscription for [`EventRouter::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Frame decoder and ordered dispatcher.
#[derive(Default)]
pub struct EventRouter {
    next_receipt: u64,
    next_subscription: u64,
    subscribers: Vec<(SubscriptionId, Box<dyn EventSink>)>,
    dropped: u64,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("next_receipt", &self.next_receipt)
            .field("subscribers", &self.subscribers.len())
            .field("dropped", &self.dropped)
            .finish()
    }
}

impl EventRouter {
    /// Router with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one raw frame.
    ///
    /// # Errors
    ///
    /// Returns the decode error after logging it. The frame is dropped.
    pub fn decode(&mut self, raw: &str) -> Result<Routed, DecodeError> {
        match DomainEvent::from_frame(raw) {
            Ok((seq, event)) => {
                let receipt = self.next_receipt;
                self.next_receipt += 1;
                trace!(receipt, ?seq, event = event.name().canonical(), "frame decoded");
                Ok(Routed { receipt, seq, event })
            },
            Err(err) => {
                self.dropped += 1;
                warn!(error = %err, len = raw.len(), "dropping undecodable frame");
                Err(err)
            },
        }
    }

    /// Deliver an event to every subscriber, in subscription order.
    ///
    /// Returns how many subscribers saw it.
    pub fn dispatch(&mut self, routed: &Routed) -> usize {
        for (_, sink) in &mut self.subscribers {
            sink.on_event(routed);
        }
        self.subscribers.len()
    }

    /// Register a subscriber.
    pub fn subscribe(&mut self, sink: impl EventSink + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(sink)));
        id
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    /// Frames dropped by [`Self::decode`] so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
