//! Outbound channel into the viewer.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("No guest channel attached")]
    Unattached,
    #[error("Guest entry point {0} is not registered")]
    EntryPointMissing(String),
    #[error("Guest handler failed: {0}")]
    GuestFault(String),
    #[error("Guest channel closed")]
    Closed,
}

/// Handle that can call a named function inside the viewer.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait GuestChannel: Send + Sync {
    /// Call `entry_point(payload)` in the viewer. Fire-and-forget: success
    /// only means the call was handed over.
    fn invoke(&self, entry_point: &str, payload: &str) -> Result<(), ChannelError>;
}

/// Ability to evaluate a script in the embedded view, as webviews expose it.
pub trait ScriptSink: Send + Sync {
    fn inject(&self, script: &str) -> Result<(), ChannelError>;
}

impl<F> ScriptSink for F
where
    F: Fn(&str) -> Result<(), ChannelError> + Send + Sync,
{
    fn inject(&self, script: &str) -> Result<(), ChannelError> {
        self(script)
    }
}

/// `GuestChannel` over a script-injection capability.
///
/// Each call becomes a guarded snippet that does nothing if the entry point
/// is not (yet) defined and never lets a viewer exception escape.
pub struct ScriptInjector<S> {
    sink: S,
}

impl<S: ScriptSink> ScriptInjector<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }
}

impl<S: ScriptSink> GuestChannel for ScriptInjector<S> {
    fn invoke(&self, entry_point: &str, payload: &str) -> Result<(), ChannelError> {
        if !is_identifier(entry_point) {
            return Err(ChannelError::EntryPointMissing(entry_point.to_string()));
        }
        self.sink.inject(&injection_script(entry_point, payload))
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Script calling `window.<entry_point>` with `payload` as a string literal.
pub fn injection_script(entry_point: &str, payload: &str) -> String {
    // JSON string literals are valid JS except for the two line separators.
    let literal = Value::String(payload.to_string())
        .to_string()
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029");
    format!(
        "(function() {{ try {{ if (window.{entry_point}) {{ window.{entry_point}({literal}); }} }} \
         catch (e) {{ console.error('[bridge] {entry_point} failed', e); }} }})(); true;"
    )
}
