//! Viewer connection lifecycle.
//!
//! The host never talks to a socket; "connection" here is whether the viewer
//! announced itself and whether its renderer came up.

use kanko_shared::Event;
use tokio::sync::watch;

/// How far the viewer got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Waiting for `READY`
    #[default]
    Loading,
    /// Viewer accepted commands
    Ready,
    /// Viewer reported a model error; terminal
    Error,
}

impl ConnectionState {
    /// State after receiving `event`.
    ///
    /// `Error` is terminal and nothing leads back to `Loading`.
    pub fn on_event(self, event: &Event) -> Self {
        match (self, event) {
            (Self::Error, _) => Self::Error,
            (_, Event::ModelError(_)) => Self::Error,
            (_, Event::Ready) => Self::Ready,
            (state, _) => state,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a UI needs to re-render the avatar area.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeSnapshot {
    pub connection_state: ConnectionState,
    pub last_event: Option<Event>,
}

/// Observable bridge state for UI binding.
///
/// Cheap to clone; every clone sees the same state.
#[derive(Clone)]
pub struct BridgeObserver {
    rx: watch::Receiver<BridgeSnapshot>,
}

impl BridgeObserver {
    pub fn new(rx: watch::Receiver<BridgeSnapshot>) -> Self {
        Self { rx }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.rx.borrow().connection_state
    }

    pub fn is_ready(&self) -> bool {
        self.connection_state() == ConnectionState::Ready
    }

    pub fn last_event(&self) -> Option<Event> {
        self.rx.borrow().last_event.clone()
    }

    pub fn snapshot(&self) -> BridgeSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next state change. Returns `false` once the bridge is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_then_error_is_terminal() {
        let state = ConnectionState::default()
            .on_event(&Event::Ready)
            .on_event(&Event::model_error("boom", None))
            .on_event(&Event::Ready);
        assert_eq!(state, ConnectionState::Error);
    }

    #[test]
    fn test_other_events_keep_state() {
        assert_eq!(
            ConnectionState::Loading.on_event(&Event::TtsFinished),
            ConnectionState::Loading
        );
        assert_eq!(
            ConnectionState::Ready.on_event(&Event::LipSyncFinished),
            ConnectionState::Ready
        );
    }

    #[test]
    fn test_model_error_before_ready() {
        assert_eq!(
            ConnectionState::Loading.on_event(&Event::model_error("no core", None)),
            ConnectionState::Error
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Ready.to_string(), "ready");
    }

    #[tokio::test]
    async fn test_observer_sees_updates() {
        let (tx, rx) = watch::channel(BridgeSnapshot::default());
        let mut observer = BridgeObserver::new(rx);
        assert_eq!(observer.connection_state(), ConnectionState::Loading);

        tx.send_modify(|s| {
            s.connection_state = ConnectionState::Ready;
            s.last_event = Some(Event::Ready);
        });

        assert!(observer.changed().await);
        assert!(observer.is_ready());
        assert_eq!(observer.last_event(), Some(Event::Ready));

        drop(tx);
        assert!(!observer.changed().await);
    }
}
