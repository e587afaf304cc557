//! Wire messages of the bidirectional streaming API
//!
//! JSON with camelCase keys. Only the fields the voice path uses are modeled;
//! unknown fields are ignored on receipt.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::prompt::live_instruction;
use crate::voice::EncodedFrame;

/// Requested response modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modality {
    /// Spoken audio replies
    Audio,
    /// Text replies
    Text,
}

/// Session-open configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetup {
    /// Model identifier without the `models/` prefix
    pub model: String,
    /// System prompt text
    pub system_instruction: String,
    /// Prebuilt output voice name
    pub voice_name: String,
    /// Requested response modality
    pub response_modality: Modality,
}

impl SessionSetup {
    /// Audio session with the given model, prompt and voice
    #[must_use]
    pub fn audio(
        model: impl Into<String>,
        system_instruction: impl Into<String>,
        voice_name: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            system_instruction: system_instruction.into(),
            voice_name: voice_name.into(),
            response_modality: Modality::Audio,
        }
    }

    /// Audio session for the configured model, voice and mentor persona
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::audio(
            config.live.model.clone(),
            live_instruction(&config.system_instruction),
            config.live.voice.clone(),
        )
    }

    /// Build the first message sent on a new connection
    #[must_use]
    pub fn to_message(&self) -> ClientMessage {
        let model = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };

        ClientMessage::Setup(Setup {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec![self.response_modality],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: self.voice_name.clone(),
                        },
                    },
                },
            },
            system_instruction: Content::text(&self.system_instruction),
        })
    }
}

/// Messages sent by the client
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Session configuration, sent once first
    Setup(Setup),
    /// Streamed microphone audio
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    /// Wrap one encoded audio frame
    #[must_use]
    pub fn audio(frame: EncodedFrame) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![frame],
        })
    }
}

/// `setup` payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Fully qualified model name
    pub model: String,
    /// Generation parameters
    pub generation_config: GenerationConfig,
    /// System prompt
    pub system_instruction: Content,
}

/// Generation parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Response modalities
    pub response_modalities: Vec<Modality>,
    /// Voice selection
    pub speech_config: SpeechConfig,
}

/// Voice selection
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    /// Voice configuration
    pub voice_config: VoiceConfig,
}

/// Voice configuration
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    /// Prebuilt voice
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

/// Prebuilt voice
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    /// Voice name, e.g. "Kore"
    pub voice_name: String,
}

/// `realtimeInput` payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    /// Encoded audio frames
    pub media_chunks: Vec<EncodedFrame>,
}

/// Content made of parts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    /// Author role, absent on system instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Ordered parts
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// Single text part without a role
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self {
            role: None,
            parts: vec![Part {
                text: Some(text.to_string()),
                inline_data: None,
            }],
        }
    }
}

/// One content part
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Inline binary payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

/// Base64 payload with its media type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    /// Media type, e.g. `audio/pcm;rate=24000`
    #[serde(default)]
    pub mime_type: String,
    /// Base64 data
    pub data: String,
}

/// Messages sent by the server
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    /// Acknowledges the setup message
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    /// Model output
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    /// Server is about to close the connection
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

/// Model output for the current turn
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    /// Generated content
    #[serde(default)]
    pub model_turn: Option<Content>,
    /// The model finished its turn
    #[serde(default)]
    pub turn_complete: bool,
    /// The model was interrupted by user speech
    #[serde(default)]
    pub interrupted: bool,
}

/// Advance notice of disconnection
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    /// Remaining time, e.g. "10s"
    #[serde(default)]
    pub time_left: Option<String>,
}

impl ServerMessage {
    /// Parse a JSON frame
    ///
    /// # Errors
    ///
    /// Returns error if the frame is not a valid server message
    pub fn parse(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Inline audio payloads in part order
    pub fn audio_chunks(&self) -> impl Iterator<Item = &InlineData> {
        self.server_content
            .iter()
            .filter_map(|content| content.model_turn.as_ref())
            .flat_map(|turn| turn.parts.iter())
            .filter_map(|part| part.inline_data.as_ref())
            .filter(|data| data.mime_type.is_empty() || data.mime_type.starts_with("audio/"))
    }
}
