//! Kanko Shared - Bridge protocol shared by the native host and the avatar viewer
//!
//! This crate contains everything both sides of the bridge must agree on:
//! - Command and event types (`messages`)
//! - The envelope and its codec (`codec`)
//! - The clock port used to stamp envelopes (`clock`)
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - serde, uuid, chrono, thiserror, tracing
//! 2. **No behaviour** - pure data types and serialization
//! 3. **Forward compatible** - unknown tags decode instead of failing

pub mod clock;
pub mod codec;
pub mod messages;

pub use clock::{ClockPort, SystemClock};
pub use codec::{preview, Codec, Envelope, Message, ParseFailure};
pub use messages::{
    Command, ErrorPayload, Event, ExpressionErrorPayload, ModelErrorPayload, ModelLoadedPayload,
    MotionErrorPayload, MotionPayload, PlayMotionPayload, SetExpressionPayload, SetModelPayload,
    StartLipSyncPayload, StartTtsPayload, TtsStartedPayload, DEFAULT_MOTION_INDEX,
    DEFAULT_MOTION_PRIORITY,
};

#[cfg(any(test, feature = "testing"))]
pub use clock::{FixedClock, MockClockPort};

/// Name of the viewer-side function the host invokes with each command envelope.
pub const GUEST_ENTRY_POINT: &str = "dispatchRNCommand";
