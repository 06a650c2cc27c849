//! Host side of the bridge.
//!
//! Sends commands into the viewer through an attached `GuestChannel` and
//! turns the viewer's posted messages into connection state and events.
//! Neither direction ever fails loudly: problems are logged and the caller
//! carries on.

use std::sync::{Arc, PoisonError, RwLock};

use kanko_shared::{preview, Codec, Command, Event, Message, GUEST_ENTRY_POINT};
use tokio::sync::watch;

use crate::channel::GuestChannel;
use crate::connection::{BridgeObserver, BridgeSnapshot, ConnectionState};
use crate::event_bus::{EventBus, Subscription};

/// What happened to a command. Purely informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the viewer
    Delivered,
    /// No channel attached; the command is gone for good
    Dropped,
    /// Channel or encoding failure, already logged
    Failed(String),
}

pub struct HostBridge {
    codec: Codec,
    channel: RwLock<Option<Arc<dyn GuestChannel>>>,
    event_bus: EventBus,
    snapshot: watch::Sender<BridgeSnapshot>,
}

impl HostBridge {
    pub fn new(codec: Codec) -> Self {
        let (snapshot, _) = watch::channel(BridgeSnapshot::default());
        Self {
            codec,
            channel: RwLock::new(None),
            event_bus: EventBus::new(),
            snapshot,
        }
    }

    pub fn attach(&self, channel: Arc<dyn GuestChannel>) {
        *self.channel.write().unwrap_or_else(PoisonError::into_inner) = Some(channel);
        tracing::debug!("Guest channel attached");
    }

    pub fn detach(&self) {
        *self.channel.write().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::debug!("Guest channel detached");
    }

    pub fn is_attached(&self) -> bool {
        self.channel
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Send a command to the viewer.
    ///
    /// Without an attached channel the command is dropped, not queued.
    pub fn send_command(&self, command: Command) -> SendOutcome {
        let tag = command.tag().to_string();
        let channel = self
            .channel
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(channel) = channel else {
            tracing::warn!(command = %tag, "Guest channel not attached, command dropped");
            return SendOutcome::Dropped;
        };

        let envelope = self.codec.encode_command(command);
        let json = match envelope.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(command = %tag, error = %e, "Failed to encode command");
                return SendOutcome::Failed(e.to_string());
            }
        };

        match channel.invoke(GUEST_ENTRY_POINT, &json) {
            Ok(()) => {
                tracing::debug!(command = %tag, id = %envelope.id, "Command sent to viewer");
                SendOutcome::Delivered
            }
            Err(e) => {
                tracing::warn!(command = %tag, error = %e, "Failed to deliver command");
                SendOutcome::Failed(e.to_string())
            }
        }
    }

    /// Handle one raw message posted by the viewer.
    ///
    /// Anything that is not an event envelope is ignored; the same channel
    /// carries unrelated framework messages.
    pub fn handle_message(&self, raw: &str) {
        let envelope = match Codec::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(error = %e, preview = %preview(raw), "Ignoring non-bridge message");
                return;
            }
        };
        let event = match envelope.message {
            Message::Event(event) => event,
            Message::Command(command) => {
                tracing::debug!(command = %command.tag(), "Ignoring command posted by viewer");
                return;
            }
        };

        let mut transition = None;
        self.snapshot.send_modify(|snapshot| {
            let previous = snapshot.connection_state;
            snapshot.connection_state = previous.on_event(&event);
            if snapshot.connection_state != previous {
                transition = Some((previous, snapshot.connection_state));
            }
            snapshot.last_event = Some(event.clone());
        });

        match (&event, transition) {
            (Event::ModelError(payload), _) => {
                tracing::error!(error = %payload.error, "Viewer reported a model error");
            }
            (Event::Unknown(tag), _) => {
                tracing::debug!(event = %tag, "Unknown event from viewer");
            }
            (_, Some((from, to))) => {
                tracing::info!(from = %from, to = %to, "Viewer connection state changed");
            }
            _ => tracing::trace!(event = %event.tag(), id = %envelope.id, "Event from viewer"),
        }

        self.event_bus.dispatch(&event);
    }

    /// Register a callback for every event, invoked in receipt order, for
    /// as long as the returned subscription is held.
    pub fn subscribe(&self, callback: impl FnMut(&Event) + Send + 'static) -> Subscription {
        self.event_bus.subscribe(callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.event_bus.subscriber_count()
    }

    pub fn observer(&self) -> BridgeObserver {
        BridgeObserver::new(self.snapshot.subscribe())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.snapshot.borrow().connection_state
    }

    pub fn last_event(&self) -> Option<Event> {
        self.snapshot.borrow().last_event.clone()
    }
}

impl Default for HostBridge {
    fn default() -> Self {
        Self::new(Codec::system())
    }
}
