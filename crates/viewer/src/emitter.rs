//! Guest → host event delivery.

use std::sync::Arc;

use kanko_shared::{Codec, Event};

/// Host-provided sink for serialized event envelopes.
pub type HostPost = Arc<dyn Fn(String) + Send + Sync>;

/// Viewer-side handler registered under `GUEST_ENTRY_POINT`.
pub type EntryPoint = Arc<dyn Fn(&str) + Send + Sync>;

/// Envelopes and posts events to the host.
///
/// A detached emitter (no host) only logs, so the viewer can run standalone.
#[derive(Clone)]
pub struct EventEmitter {
    codec: Codec,
    post: Option<HostPost>,
}

impl EventEmitter {
    pub fn new(codec: Codec, post: HostPost) -> Self {
        Self {
            codec,
            post: Some(post),
        }
    }

    pub fn detached(codec: Codec) -> Self {
        Self { codec, post: None }
    }

    pub fn emit(&self, event: Event) {
        let tag = event.tag().to_string();
        let envelope = self.codec.encode_event(event);

        let Some(post) = &self.post else {
            tracing::debug!(event = %tag, "No host attached, event not posted");
            return;
        };

        match envelope.to_json() {
            Ok(json) => {
                tracing::debug!(event = %tag, id = %envelope.id, "Posting event to host");
                post(json);
            }
            Err(e) => tracing::error!(event = %tag, error = %e, "Failed to serialize event"),
        }
    }
}
