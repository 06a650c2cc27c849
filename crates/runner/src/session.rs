//! Host and viewer wired together in one process.

use std::sync::Arc;
use std::time::Duration;

use kanko_player::{HostBridge, SendOutcome, Subscription};
use kanko_shared::{Codec, Command, Event, GUEST_ENTRY_POINT};
use kanko_viewer::{
    EventEmitter, HeadlessRenderer, SpeechSynthesizer, TimedSpeech, ViewerApp, ViewerConfig,
};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::loopback::Loopback;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Timed out after {0:?} waiting for a viewer event")]
    Timeout(Duration),
    #[error("Event stream closed")]
    Closed,
}

pub struct Session {
    bridge: Arc<HostBridge>,
    viewer: Arc<ViewerApp>,
    renderer: Arc<HeadlessRenderer>,
    events: mpsc::UnboundedReceiver<Event>,
    _forward: Subscription,
    // Owns the pump tasks; dropped last.
    _loopback: Loopback,
}

impl Session {
    /// Build both sides and attach them. Must run inside a tokio runtime.
    pub fn new(config: &ViewerConfig) -> Self {
        let bridge = Arc::new(HostBridge::new(Codec::system()));
        let (tx, events) = mpsc::unbounded_channel();
        let forward = bridge.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });

        let loopback = Loopback::spawn(bridge.clone());
        let renderer = Arc::new(HeadlessRenderer::new(
            config.fallback_viewport,
            config.motion_clip,
        ));
        let speech: Arc<dyn SpeechSynthesizer> = Arc::new(TimedSpeech::new());
        let viewer = Arc::new(ViewerApp::new(
            renderer.clone(),
            Some(speech),
            EventEmitter::new(Codec::system(), loopback.host_post()),
            config.clone(),
        ));

        loopback.register_entry_point(GUEST_ENTRY_POINT, viewer.entry_point());
        bridge.attach(loopback.guest_channel());

        Self {
            bridge,
            viewer,
            renderer,
            events,
            _forward: forward,
            _loopback: loopback,
        }
    }

    /// Run the viewer startup: `READY` followed by the initial model load.
    pub async fn start(&self) {
        self.viewer.start().await;
    }

    pub fn send(&self, command: Command) -> SendOutcome {
        self.bridge.send_command(command)
    }

    /// Next event matching `predicate`; earlier events are discarded.
    pub async fn wait_for<P>(
        &mut self,
        timeout: Duration,
        mut predicate: P,
    ) -> Result<Event, SessionError>
    where
        P: FnMut(&Event) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Err(_) => return Err(SessionError::Timeout(timeout)),
                Ok(None) => return Err(SessionError::Closed),
                Ok(Some(event)) if predicate(&event) => return Ok(event),
                Ok(Some(event)) => tracing::trace!(event = %event.tag(), "Skipping event"),
            }
        }
    }

    pub fn bridge(&self) -> &Arc<HostBridge> {
        &self.bridge
    }

    pub fn viewer(&self) -> &Arc<ViewerApp> {
        &self.viewer
    }

    pub fn renderer(&self) -> &Arc<HeadlessRenderer> {
        &self.renderer
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.bridge.detach();
    }
}
