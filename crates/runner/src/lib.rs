//! Kanko Runner - host and viewer in one process
//!
//! Connects a `HostBridge` to a headless `ViewerApp` through an in-process
//! loopback that behaves like the webview boundary: FIFO in both directions,
//! no shared call stack.

pub mod config;
pub mod loopback;
pub mod session;

pub use config::RunnerConfig;
pub use loopback::Loopback;
pub use session::{Session, SessionError};
