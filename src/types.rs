//! Wire and REST payload types for the Sayna API.
//!
//! The WebSocket message shapes mirror the server's message catalogue exactly:
//! JSON objects tagged by a `type` field, with optional fields omitted rather
//! than serialized as `null`. REST types cover the health, voices, LiveKit
//! token, speak, and SIP hook endpoints.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Word pronunciation override applied before TTS synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pronunciation {
    /// The word to be pronounced differently
    pub word: String,
    /// Phonetic pronunciation or alternative spelling
    pub pronunciation: String,
}

/// Speech-to-Text configuration (without API credentials)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct STTConfig {
    /// Provider name (e.g., "deepgram", "google")
    pub provider: String,
    /// Language code for transcription (e.g., "en-US", "es-ES")
    pub language: String,
    /// Sample rate of the audio in Hz
    pub sample_rate: u32,
    /// Number of audio channels (1 for mono, 2 for stereo)
    pub channels: u16,
    /// Enable punctuation in results
    pub punctuation: bool,
    /// Encoding of the audio (e.g., "linear16", "opus")
    pub encoding: String,
    /// Model to use for transcription
    pub model: String,
}

/// Text-to-Speech configuration (without API credentials)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TTSConfig {
    /// Provider name (e.g., "elevenlabs", "deepgram")
    pub provider: String,
    /// Voice identifier for the selected provider
    pub voice_id: String,
    /// Speech rate multiplier (1.0 is normal)
    pub speaking_rate: f32,
    /// Audio format for TTS output (e.g., "mp3", "linear16")
    pub audio_format: String,
    /// Sample rate of the synthesized audio in Hz
    pub sample_rate: u32,
    /// Connection timeout in milliseconds
    pub connection_timeout: u64,
    /// Request timeout in milliseconds
    pub request_timeout: u64,
    /// Model to use for synthesis
    pub model: String,
    /// Pronunciation replacements to apply before synthesis
    #[serde(default)]
    pub pronunciations: Vec<Pronunciation>,
}

/// LiveKit room configuration for real-time audio streaming
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveKitConfig {
    /// Room name to join or create
    pub room_name: String,
    /// Enable recording for this session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_recording: Option<bool>,
    /// Storage key for the recording file (required when recording is enabled)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_file_key: Option<String>,
    /// Identity assigned to the agent participant (defaults to "sayna-ai" server-side)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sayna_participant_identity: Option<String>,
    /// Display name for the agent participant (defaults to "Sayna AI" server-side)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sayna_participant_name: Option<String>,
    /// Participant identities to listen to; empty means all participants
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listen_participants: Vec<String>,
}

/// Messages sent from the client to the Sayna server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "config")]
    Config {
        /// Enable audio processing (STT/TTS). Defaults to true server-side.
        #[serde(skip_serializing_if = "Option::is_none")]
        audio: Option<bool>,
        /// STT configuration (required only when audio is enabled)
        #[serde(skip_serializing_if = "Option::is_none")]
        stt_config: Option<STTConfig>,
        /// TTS configuration (required only when audio is enabled)
        #[serde(skip_serializing_if = "Option::is_none")]
        tts_config: Option<TTSConfig>,
        /// Optional LiveKit configuration for real-time audio streaming
        #[serde(skip_serializing_if = "Option::is_none")]
        livekit: Option<LiveKitConfig>,
    },
    #[serde(rename = "speak")]
    Speak {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        flush: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        allow_interruption: Option<bool>,
    },
    #[serde(rename = "clear")]
    Clear,
    #[serde(rename = "send_message")]
    SendMessage {
        message: String,
        role: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        debug: Option<serde_json::Value>,
    },
}

/// Message data from a Sayna session participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaynaMessage {
    /// Text message content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Binary data encoded as base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Participant/sender identity
    pub identity: String,
    /// Topic/channel for the message
    pub topic: String,
    /// Room identifier
    pub room: String,
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
}

/// Information about a session participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// Participant's unique identity
    pub identity: String,
    /// Participant's display name (if available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Room identifier
    pub room: String,
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
}

/// Messages pushed from the Sayna server to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "ready")]
    Ready {
        /// LiveKit room name (present only when LiveKit is enabled)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        livekit_room_name: Option<String>,
        /// LiveKit WebSocket URL configured on the server
        livekit_url: String,
        /// Agent participant identity (present when LiveKit is enabled)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sayna_participant_identity: Option<String>,
        /// Agent participant display name (present when LiveKit is enabled)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sayna_participant_name: Option<String>,
    },
    #[serde(rename = "stt_result")]
    STTResult {
        transcript: String,
        is_final: bool,
        is_speech_final: bool,
        confidence: f32,
    },
    #[serde(rename = "message")]
    Message { message: SaynaMessage },
    #[serde(rename = "participant_disconnected")]
    ParticipantDisconnected { participant: Participant },
    #[serde(rename = "tts_playback_complete")]
    TTSPlaybackComplete { timestamp: u64 },
    #[serde(rename = "error")]
    Error { message: String },
}

// ============================================================================
// REST API types
// ============================================================================

/// Response from the `GET /` health endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status (should be "OK")
    pub status: String,
}

fn default_unknown() -> String {
    "Unknown".to_string()
}

/// Voice descriptor from a TTS provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceDescriptor {
    /// Provider-specific identifier for the voice profile
    pub id: String,
    /// URL to a preview audio sample
    #[serde(default)]
    pub sample: String,
    /// Human-readable name supplied by the provider
    pub name: String,
    /// Detected accent associated with the voice
    #[serde(default = "default_unknown")]
    pub accent: String,
    /// Inferred gender label from provider metadata
    #[serde(default = "default_unknown")]
    pub gender: String,
    /// Primary language for synthesis
    #[serde(default = "default_unknown")]
    pub language: String,
}

/// Response from `GET /voices`: provider name to voice descriptors
pub type VoicesResponse = HashMap<String, Vec<VoiceDescriptor>>;

/// Request body for `POST /livekit/token`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveKitTokenRequest {
    /// LiveKit room to join or create
    pub room_name: String,
    /// Display name assigned to the participant
    pub participant_name: String,
    /// Unique identifier for the participant
    pub participant_identity: String,
}

/// Response from `POST /livekit/token`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveKitTokenResponse {
    /// JWT granting LiveKit permissions
    pub token: String,
    /// Echo of the requested room
    pub room_name: String,
    /// Echo of the requested identity
    pub participant_identity: String,
    /// WebSocket endpoint for the LiveKit server
    pub livekit_url: String,
}

/// Request body for `POST /speak`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakRequest {
    /// Text to convert to speech
    pub text: String,
    /// Provider configuration without API credentials
    pub tts_config: TTSConfig,
}

/// A SIP webhook hook configuration mapping a SIP domain pattern to a
/// webhook URL that receives forwarded SIP events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SipHook {
    /// SIP domain pattern (case-insensitive) to match incoming SIP requests
    pub host: String,
    /// HTTPS URL to forward webhook events to when the host pattern matches
    pub url: String,
}

/// Response from `GET /sip/hooks` and `POST /sip/hooks`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SipHooksResponse {
    /// List of configured SIP hooks
    #[serde(default)]
    pub hooks: Vec<SipHook>,
}

/// Request body for `POST /sip/hooks`. Existing hooks with matching hosts
/// are replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetSipHooksRequest {
    pub hooks: Vec<SipHook>,
}

// ============================================================================
// Webhook types
// ============================================================================

/// Participant information from a SIP webhook event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSIPParticipant {
    /// Unique identity assigned to the participant
    pub identity: String,
    /// Participant session ID from LiveKit
    pub sid: String,
    /// Display name of the SIP participant (may be absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Room information from a SIP webhook event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSIPRoom {
    /// Name of the LiveKit room
    pub name: String,
    /// Room session ID from LiveKit
    pub sid: String,
}

/// SIP webhook payload forwarded by Sayna when a SIP participant joins a
/// LiveKit room.
///
/// Instances are only produced by [`crate::webhook::WebhookReceiver::receive`]
/// after the delivery's signature and timestamp have been verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSIPEvent {
    /// SIP participant information
    pub participant: WebhookSIPParticipant,
    /// LiveKit room information
    pub room: WebhookSIPRoom,
    /// Caller's phone number (E.164 format, e.g., "+15559876543")
    pub from_phone_number: String,
    /// Called phone number (E.164 format, e.g., "+15551234567")
    pub to_phone_number: String,
    /// Room name prefix configured in Sayna (e.g., "sip-")
    pub room_prefix: String,
    /// SIP domain extracted from the To header (e.g., "example.com")
    pub sip_host: String,
    /// SIP headers from the participant's attributes, with the `sip.h.`
    /// prefix stripped (e.g., `sip.h.to` becomes `to`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sip_headers: Option<HashMap<String, String>>,
}
