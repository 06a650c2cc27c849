//! In-process message channel between host and viewer.
//!
//! Stands in for the webview boundary: each direction is a FIFO queue
//! drained by its own task, so both sides see messages in send order and
//! neither side ever runs the other's code on its own stack.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kanko_player::{ChannelError, GuestChannel, HostBridge};
use kanko_viewer::{EntryPoint, HostPost};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type EntryPoints = Arc<Mutex<HashMap<String, EntryPoint>>>;

fn lock_entries(map: &EntryPoints) -> MutexGuard<'_, HashMap<String, EntryPoint>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Loopback {
    to_guest: mpsc::UnboundedSender<(String, String)>,
    to_host: mpsc::UnboundedSender<String>,
    entry_points: EntryPoints,
    tasks: Vec<JoinHandle<()>>,
}

impl Loopback {
    /// Start both pumps; messages for the host go to `host`.
    pub fn spawn(host: Arc<HostBridge>) -> Self {
        let (to_guest, mut guest_rx) = mpsc::unbounded_channel::<(String, String)>();
        let (to_host, mut host_rx) = mpsc::unbounded_channel::<String>();
        let entry_points: EntryPoints = Arc::new(Mutex::new(HashMap::new()));

        let registry = entry_points.clone();
        let guest = tokio::spawn(async move {
            while let Some((name, payload)) = guest_rx.recv().await {
                let handler = lock_entries(&registry).get(&name).cloned();
                match handler {
                    Some(handler) => handler(&payload),
                    // Same as the injected guard: an undefined entry point is a no-op.
                    None => {
                        tracing::debug!(entry_point = %name, "Entry point not defined, skipped")
                    }
                }
            }
        });

        let host_pump = tokio::spawn(async move {
            while let Some(raw) = host_rx.recv().await {
                host.handle_message(&raw);
            }
        });

        Self {
            to_guest,
            to_host,
            entry_points,
            tasks: vec![guest, host_pump],
        }
    }

    /// Viewer-side registration of a named entry point.
    pub fn register_entry_point(&self, name: &str, handler: EntryPoint) {
        lock_entries(&self.entry_points).insert(name.to_string(), handler);
        tracing::debug!(entry_point = %name, "Entry point registered");
    }

    /// Host's handle into the viewer.
    pub fn guest_channel(&self) -> Arc<dyn GuestChannel> {
        Arc::new(LoopbackChannel {
            tx: self.to_guest.clone(),
        })
    }

    /// Viewer's way of posting messages to the host.
    pub fn host_post(&self) -> HostPost {
        let tx = self.to_host.clone();
        Arc::new(move |json: String| {
            if tx.send(json).is_err() {
                tracing::debug!("Host side closed, message discarded");
            }
        })
    }
}

impl Drop for Loopback {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

struct LoopbackChannel {
    tx: mpsc::UnboundedSender<(String, String)>,
}

impl GuestChannel for LoopbackChannel {
    fn invoke(&self, entry_point: &str, payload: &str) -> Result<(), ChannelError> {
        self.tx
            .send((entry_point.to_string(), payload.to_string()))
            .map_err(|_| ChannelError::Closed)
    }
}
