//! Rust client SDK for the Sayna real-time voice API.
//!
//! The SDK covers three surfaces:
//!
//! - [`SaynaClient`] — WebSocket voice sessions: STT streaming, TTS
//!   playback, LiveKit rooms, and data messages.
//! - [`SaynaHttpClient`] — REST endpoints: health, voices, LiveKit
//!   tokens, one-shot speech synthesis, and SIP hook management.
//! - [`WebhookReceiver`] — verification of signed SIP webhook deliveries
//!   with HMAC-SHA256 and replay protection.

pub mod client;
pub mod errors;
pub mod http;
pub mod types;
pub mod webhook;

// Re-export commonly used items for convenience
pub use client::{ConnectOptions, ConnectionState, EventCallback, ReadyInfo, STTResult, SaynaClient};
pub use errors::{SaynaError, SaynaResult};
pub use http::SaynaHttpClient;
pub use types::{
    ClientMessage, HealthResponse, LiveKitConfig, LiveKitTokenRequest, LiveKitTokenResponse,
    Participant, Pronunciation, STTConfig, SaynaMessage, ServerMessage, SipHook, SpeakRequest,
    TTSConfig, VoiceDescriptor, VoicesResponse, WebhookSIPEvent, WebhookSIPParticipant,
    WebhookSIPRoom,
};
pub use webhook::WebhookReceiver;
