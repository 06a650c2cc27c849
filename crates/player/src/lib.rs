//! Kanko Player - the native host side of the avatar bridge
//!
//! ## Module Structure
//!
//! - `bridge` - `HostBridge`: command sending and event intake
//! - `channel` - `GuestChannel` port and the script-injection adapter
//! - `connection` - viewer connection state and its observer
//! - `event_bus` - synchronous event subscribers
//! - `context` - task-scoped bridge provider
//! - `audio_guide` - audio-guide playback driving lip-sync
//! - `spot_cue` - expression/motion cues per spot

pub mod audio_guide;
pub mod bridge;
pub mod channel;
pub mod connection;
pub mod context;
pub mod event_bus;
pub mod spot_cue;

pub use audio_guide::{format_time, AudioGuidePlayer, PlaybackSnapshot, PlaybackState};
pub use bridge::{HostBridge, SendOutcome};
pub use channel::{injection_script, ChannelError, GuestChannel, ScriptInjector, ScriptSink};
pub use connection::{BridgeObserver, BridgeSnapshot, ConnectionState};
pub use context::{use_bridge, BridgeContext, BridgeError, BridgeProvider};
pub use event_bus::{EventBus, Subscription};
pub use spot_cue::{MotionCue, SpotCue, SpotVisit};

#[cfg(any(test, feature = "testing"))]
pub use channel::MockGuestChannel;
