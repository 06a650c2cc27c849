//! Scoped access to the host bridge.
//!
//! Code running under `BridgeProvider::scope` can reach the bridge with
//! `use_bridge()` instead of threading it through every call.

use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use crate::bridge::HostBridge;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("use_bridge called outside a BridgeProvider scope")]
    NoProvider,
}

/// Cloneable handle to the provided bridge.
#[derive(Clone)]
pub struct BridgeContext(Arc<HostBridge>);

impl BridgeContext {
    pub fn new(bridge: Arc<HostBridge>) -> Self {
        Self(bridge)
    }

    pub fn bridge(&self) -> &Arc<HostBridge> {
        &self.0
    }
}

impl Deref for BridgeContext {
    type Target = HostBridge;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

tokio::task_local! {
    static BRIDGE: BridgeContext;
}

pub struct BridgeProvider;

impl BridgeProvider {
    /// Run `future` with `bridge` provided to everything it awaits.
    ///
    /// Tasks spawned from inside the scope do not inherit it.
    pub async fn scope<F>(bridge: Arc<HostBridge>, future: F) -> F::Output
    where
        F: Future,
    {
        BRIDGE.scope(BridgeContext::new(bridge), future).await
    }

    /// Synchronous variant of [`BridgeProvider::scope`].
    pub fn sync_scope<R>(bridge: Arc<HostBridge>, f: impl FnOnce() -> R) -> R {
        BRIDGE.sync_scope(BridgeContext::new(bridge), f)
    }
}

/// The bridge provided by the nearest enclosing scope.
pub fn use_bridge() -> Result<BridgeContext, BridgeError> {
    BRIDGE
        .try_with(BridgeContext::clone)
        .map_err(|_| BridgeError::NoProvider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use kanko_shared::{Codec, Event};

    #[test]
    fn test_outside_provider_fails() {
        assert_eq!(use_bridge().err(), Some(BridgeError::NoProvider));
    }

    #[tokio::test]
    async fn test_scope_provides_same_bridge() {
        let bridge = Arc::new(HostBridge::default());

        let found = BridgeProvider::scope(bridge.clone(), async {
            tokio::task::yield_now().await;
            use_bridge().expect("provided")
        })
        .await;

        assert!(Arc::ptr_eq(found.bridge(), &bridge));
    }

    #[tokio::test]
    async fn test_context_reads_bridge_state() {
        let bridge = Arc::new(HostBridge::default());
        let raw = Codec::system()
            .encode_event(Event::Ready)
            .to_json()
            .expect("serialize");

        let state = BridgeProvider::scope(bridge, async move {
            let ctx = use_bridge().expect("provided");
            ctx.handle_message(&raw);
            ctx.connection_state()
        })
        .await;

        assert_eq!(state, ConnectionState::Ready);
    }

    #[tokio::test]
    async fn test_spawned_tasks_do_not_inherit() {
        let bridge = Arc::new(HostBridge::default());
        let inner = BridgeProvider::scope(bridge, async {
            tokio::spawn(async { use_bridge().is_ok() })
                .await
                .expect("join")
        })
        .await;
        assert!(!inner);
    }

    #[test]
    fn test_sync_scope() {
        let bridge = Arc::new(HostBridge::default());
        let provided = BridgeProvider::sync_scope(bridge, || use_bridge().is_ok());
        assert!(provided);
    }
}
