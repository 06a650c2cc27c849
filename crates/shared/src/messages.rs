//! Bridge message types for Host-Viewer communication
//!
//! Commands flow from the native host into the avatar viewer; events flow
//! back. Both serialize as `{"type": TAG, "payload": {...}}` with camelCase
//! payload fields. Variants without data omit `payload`.
//!
//! ## Versioning Policy
//!
//! - New variants can be added at the end (forward compatible)
//! - Renaming a tag is a breaking change
//! - Unknown tags deserialize to `Unknown(tag)` so the receiver can log and
//!   ignore them; `Unknown` is never serialized

use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Motion index used when `PLAY_MOTION` omits one.
pub const DEFAULT_MOTION_INDEX: u32 = 0;

/// Motion priority used when `PLAY_MOTION` omits one.
pub const DEFAULT_MOTION_PRIORITY: u8 = 2;

// =============================================================================
// Commands (Host → Viewer)
// =============================================================================

/// Instructions sent from the host to the avatar viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Replace the current avatar model
    SetModel(SetModelPayload),
    /// Play a motion clip, completion is reported with `MOTION_FINISHED`
    PlayMotion(PlayMotionPayload),
    /// Apply a named expression, an empty id resets to the default face
    SetExpression(SetExpressionPayload),
    /// Start mouth movement, audio driven or simulated
    StartLipSync(StartLipSyncPayload),
    /// Silently cancel mouth movement
    StopLipSync,
    /// Speak text through the device speech engine
    StartTts(StartTtsPayload),
    /// Cancel the current utterance
    StopTts,

    /// Tag sent by a newer host that this viewer does not understand.
    #[serde(skip_serializing)]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetModelPayload {
    pub model_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayMotionPayload {
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
}

impl PlayMotionPayload {
    pub fn index_or_default(&self) -> u32 {
        self.index.unwrap_or(DEFAULT_MOTION_INDEX)
    }

    pub fn priority_or_default(&self) -> u8 {
        self.priority.unwrap_or(DEFAULT_MOTION_PRIORITY)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetExpressionPayload {
    pub expression_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartLipSyncPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// Seconds of simulated mouth movement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTtsPayload {
    pub text: String,
    pub lang: String,
}

impl Command {
    pub fn set_model(model_url: impl Into<String>) -> Self {
        Self::SetModel(SetModelPayload {
            model_url: model_url.into(),
        })
    }

    pub fn play_motion(group: impl Into<String>, index: Option<u32>, priority: Option<u8>) -> Self {
        Self::PlayMotion(PlayMotionPayload {
            group: group.into(),
            index,
            priority,
        })
    }

    pub fn set_expression(expression_id: impl Into<String>) -> Self {
        Self::SetExpression(SetExpressionPayload {
            expression_id: expression_id.into(),
        })
    }

    pub fn start_lip_sync(audio_url: Option<String>, duration: Option<f64>) -> Self {
        Self::StartLipSync(StartLipSyncPayload {
            audio_url,
            duration,
        })
    }

    pub fn start_tts(text: impl Into<String>, lang: impl Into<String>) -> Self {
        Self::StartTts(StartTtsPayload {
            text: text.into(),
            lang: lang.into(),
        })
    }

    /// Wire tag of this command.
    pub fn tag(&self) -> &str {
        match self {
            Self::SetModel(_) => "SET_MODEL",
            Self::PlayMotion(_) => "PLAY_MOTION",
            Self::SetExpression(_) => "SET_EXPRESSION",
            Self::StartLipSync(_) => "START_LIP_SYNC",
            Self::StopLipSync => "STOP_LIP_SYNC",
            Self::StartTts(_) => "START_TTS",
            Self::StopTts => "STOP_TTS",
            Self::Unknown(tag) => tag,
        }
    }
}

impl TryFrom<TaggedValue> for Command {
    type Error = serde_json::Error;

    fn try_from(raw: TaggedValue) -> Result<Self, Self::Error> {
        let TaggedValue { tag, payload } = raw;
        Ok(match tag.as_str() {
            "SET_MODEL" => Self::SetModel(decode_payload(payload)?),
            "PLAY_MOTION" => Self::PlayMotion(decode_payload(payload)?),
            "SET_EXPRESSION" => Self::SetExpression(decode_payload(payload)?),
            "START_LIP_SYNC" => Self::StartLipSync(decode_payload(payload)?),
            "STOP_LIP_SYNC" => Self::StopLipSync,
            "START_TTS" => Self::StartTts(decode_payload(payload)?),
            "STOP_TTS" => Self::StopTts,
            _ => Self::Unknown(tag),
        })
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = TaggedValue::deserialize(deserializer)?;
        Command::try_from(raw).map_err(D::Error::custom)
    }
}

// =============================================================================
// Events (Viewer → Host)
// =============================================================================

/// Notifications sent from the avatar viewer back to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    /// Viewer finished initializing and accepts commands
    Ready,
    ModelLoaded(ModelLoadedPayload),
    ModelError(ModelErrorPayload),
    /// A motion clip played to completion
    MotionFinished(MotionPayload),
    LipSyncFinished,
    TtsStarted(TtsStartedPayload),
    TtsFinished,
    TtsError(ErrorPayload),
    MotionError(MotionErrorPayload),
    ExpressionError(ExpressionErrorPayload),

    /// Tag sent by a newer viewer that this host does not understand.
    #[serde(skip_serializing)]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelLoadedPayload {
    pub model_url: String,
    pub motion_groups: Vec<String>,
    pub expressions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelErrorPayload {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionPayload {
    pub group: String,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsStartedPayload {
    /// Whole seconds, at least 1
    pub estimated_duration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionErrorPayload {
    pub error: String,
    pub group: String,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionErrorPayload {
    pub error: String,
    pub expression_id: String,
}

impl Event {
    pub fn model_error(error: impl Into<String>, model_url: Option<String>) -> Self {
        Self::ModelError(ModelErrorPayload {
            error: error.into(),
            model_url,
        })
    }

    pub fn tts_error(error: impl Into<String>) -> Self {
        Self::TtsError(ErrorPayload {
            error: error.into(),
        })
    }

    /// Wire tag of this event.
    pub fn tag(&self) -> &str {
        match self {
            Self::Ready => "READY",
            Self::ModelLoaded(_) => "MODEL_LOADED",
            Self::ModelError(_) => "MODEL_ERROR",
            Self::MotionFinished(_) => "MOTION_FINISHED",
            Self::LipSyncFinished => "LIP_SYNC_FINISHED",
            Self::TtsStarted(_) => "TTS_STARTED",
            Self::TtsFinished => "TTS_FINISHED",
            Self::TtsError(_) => "TTS_ERROR",
            Self::MotionError(_) => "MOTION_ERROR",
            Self::ExpressionError(_) => "EXPRESSION_ERROR",
            Self::Unknown(tag) => tag,
        }
    }
}

impl TryFrom<TaggedValue> for Event {
    type Error = serde_json::Error;

    fn try_from(raw: TaggedValue) -> Result<Self, Self::Error> {
        let TaggedValue { tag, payload } = raw;
        Ok(match tag.as_str() {
            "READY" => Self::Ready,
            "MODEL_LOADED" => Self::ModelLoaded(decode_payload(payload)?),
            "MODEL_ERROR" => Self::ModelError(decode_payload(payload)?),
            "MOTION_FINISHED" => Self::MotionFinished(decode_payload(payload)?),
            "LIP_SYNC_FINISHED" => Self::LipSyncFinished,
            "TTS_STARTED" => Self::TtsStarted(decode_payload(payload)?),
            "TTS_FINISHED" => Self::TtsFinished,
            "TTS_ERROR" => Self::TtsError(decode_payload(payload)?),
            "MOTION_ERROR" => Self::MotionError(decode_payload(payload)?),
            "EXPRESSION_ERROR" => Self::ExpressionError(decode_payload(payload)?),
            _ => Self::Unknown(tag),
        })
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = TaggedValue::deserialize(deserializer)?;
        Event::try_from(raw).map_err(D::Error::custom)
    }
}

// =============================================================================
// Tag decoding
// =============================================================================

/// `{"type": ..., "payload": ...}` before the tag is resolved to a variant.
#[derive(Debug, Deserialize)]
pub struct TaggedValue {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub payload: Value,
}

/// A missing payload is read as `{}` so all-optional payloads still decode.
fn decode_payload<T: DeserializeOwned>(payload: Value) -> Result<T, serde_json::Error> {
    let payload = match payload {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(payload)
}
