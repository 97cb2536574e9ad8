//! WebSocket client for real-time Sayna voice sessions.
//!
//! [`SaynaClient`] opens the `/ws` endpoint, sends the session
//! configuration, streams audio, and dispatches server-pushed events
//! (transcripts, messages, playback notifications) to registered async
//! callbacks. REST calls are available through
//! [`SaynaClient::http_client`], which derives the HTTP base URL from the
//! WebSocket URL.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{RwLock, broadcast, mpsc};
use parking_lot::RwLock as SyncRwLock;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use http::HeaderMap;

use crate::errors::{SaynaError, SaynaResult};
use crate::http::SaynaHttpClient;
use crate::types::{
    ClientMessage, HealthResponse, LiveKitConfig, LiveKitTokenRequest, LiveKitTokenResponse,
    Participant, STTConfig, SaynaMessage, ServerMessage, SipHook, SpeakRequest, TTSConfig,
    VoicesResponse,
};

/// Async callback invoked with a session event
pub type EventCallback<T> =
    Arc<dyn Fn(T) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Speech recognition result pushed by the server
#[derive(Debug, Clone, PartialEq)]
pub struct STTResult {
    pub transcript: String,
    pub is_final: bool,
    pub is_speech_final: bool,
    pub confidence: f32,
}

/// Session details delivered with the server's `ready` message
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyInfo {
    /// LiveKit room name (present only when LiveKit was configured)
    pub livekit_room_name: Option<String>,
    /// LiveKit WebSocket URL configured on the server
    pub livekit_url: String,
    /// Agent participant identity in the LiveKit room
    pub sayna_participant_identity: Option<String>,
    /// Agent participant display name in the LiveKit room
    pub sayna_participant_name: Option<String>,
}

/// Connection state of the voice session
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

/// Session options sent in the initial `config` message.
///
/// Audio processing is enabled by default and requires both `stt_config`
/// and `tts_config`; set `text_only` for sessions without voice.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub stt_config: Option<STTConfig>,
    pub tts_config: Option<TTSConfig>,
    pub livekit: Option<LiveKitConfig>,
    /// Disable audio processing for text-only sessions
    pub text_only: bool,
}

#[derive(Default)]
struct Callbacks {
    on_ready: Option<EventCallback<ReadyInfo>>,
    on_stt_result: Option<EventCallback<STTResult>>,
    on_audio: Option<EventCallback<bytes::Bytes>>,
    on_message: Option<EventCallback<SaynaMessage>>,
    on_participant_disconnected: Option<EventCallback<Participant>>,
    on_tts_playback_complete: Option<EventCallback<u64>>,
    on_error: Option<EventCallback<String>>,
}

/// Client for the Sayna real-time voice WebSocket API.
///
/// ```no_run
/// use sayna_client::{ConnectOptions, SaynaClient};
///
/// # async fn run() -> Result<(), sayna_client::SaynaError> {
/// let mut client = SaynaClient::new("wss://api.sayna.example.com/ws", None)?;
/// client.on_stt_result(|result| {
///     Box::pin(async move {
///         println!("{}", result.transcript);
///     })
/// });
/// client.connect(ConnectOptions::default()).await?;
/// # Ok(())
/// # }
/// ```
pub struct SaynaClient {
    ws_url: Url,
    api_key: Option<String>,
    http: SaynaHttpClient,
    state: Arc<RwLock<ConnectionState>>,
    ready: Arc<RwLock<Option<ReadyInfo>>>,
    callbacks: Arc<SyncRwLock<Callbacks>>,
    ws_sender: Option<mpsc::UnboundedSender<Message>>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    connection_handle: Option<tokio::task::JoinHandle<()>>,
}

impl SaynaClient {
    /// Creates a client for the given WebSocket URL (`ws://` or `wss://`).
    /// The API key, when provided, is sent as a `Bearer` token during the
    /// WebSocket handshake and on REST requests.
    pub fn new(ws_url: &str, api_key: Option<String>) -> SaynaResult<Self> {
        let ws_url = Url::parse(ws_url)
            .map_err(|e| SaynaError::Validation(format!("Invalid WebSocket URL '{}': {}", ws_url, e)))?;
        match ws_url.scheme() {
            "ws" | "wss" => {}
            scheme => {
                return Err(SaynaError::Validation(format!(
                    "Invalid WebSocket URL scheme '{}': expected ws or wss",
                    scheme
                )));
            }
        }

        let http = SaynaHttpClient::new(&derive_rest_base_url(&ws_url), api_key.clone())?;

        Ok(Self {
            ws_url,
            api_key,
            http,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            ready: Arc::new(RwLock::new(None)),
            callbacks: Arc::new(SyncRwLock::new(Callbacks::default())),
            ws_sender: None,
            shutdown_tx: None,
            connection_handle: None,
        })
    }

    /// Returns the REST client for the same deployment. The HTTP base URL
    /// is derived from the WebSocket URL (`wss://host/ws` becomes
    /// `https://host`).
    pub fn http_client(&self) -> SaynaHttpClient {
        self.http.clone()
    }

    /// Checks server health via `GET /`.
    pub async fn health_check(&self) -> SaynaResult<HealthResponse> {
        self.http.health().await
    }

    /// Lists available TTS voices grouped by provider.
    pub async fn get_voices(&self) -> SaynaResult<VoicesResponse> {
        self.http.get_voices().await
    }

    /// Synthesizes speech over REST without a WebSocket session, returning
    /// the audio bytes and response headers. For in-session playback use
    /// [`SaynaClient::speak`].
    pub async fn synthesize(&self, request: &SpeakRequest) -> SaynaResult<(bytes::Bytes, HeaderMap)> {
        self.http.speak(request).await
    }

    /// Generates a LiveKit access token.
    pub async fn get_livekit_token(
        &self,
        request: &LiveKitTokenRequest,
    ) -> SaynaResult<LiveKitTokenResponse> {
        self.http.get_livekit_token(request).await
    }

    /// Fetches the configured SIP webhook hooks.
    pub async fn get_sip_hooks(&self) -> SaynaResult<Vec<SipHook>> {
        self.http.get_sip_hooks().await
    }

    /// Creates or replaces SIP webhook hooks.
    pub async fn set_sip_hooks(&self, hooks: Vec<SipHook>) -> SaynaResult<Vec<SipHook>> {
        self.http.set_sip_hooks(hooks).await
    }

    /// Registers a callback for the server's `ready` message.
    pub fn on_ready<F>(&self, callback: F)
    where
        F: Fn(ReadyInfo) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static,
    {
        self.callbacks.write().on_ready = Some(Arc::new(callback));
    }

    /// Registers a callback for speech recognition results.
    pub fn on_stt_result<F>(&self, callback: F)
    where
        F: Fn(STTResult) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static,
    {
        self.callbacks.write().on_stt_result = Some(Arc::new(callback));
    }

    /// Registers a callback for TTS audio chunks, delivered as binary
    /// WebSocket frames during playback.
    pub fn on_audio<F>(&self, callback: F)
    where
        F: Fn(bytes::Bytes) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static,
    {
        self.callbacks.write().on_audio = Some(Arc::new(callback));
    }

    /// Registers a callback for data messages from other participants.
    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(SaynaMessage) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static,
    {
        self.callbacks.write().on_message = Some(Arc::new(callback));
    }

    /// Registers a callback for participant disconnections.
    pub fn on_participant_disconnected<F>(&self, callback: F)
    where
        F: Fn(Participant) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static,
    {
        self.callbacks.write().on_participant_disconnected = Some(Arc::new(callback));
    }

    /// Registers a callback invoked when TTS playback finishes. The
    /// argument is the server's Unix timestamp in milliseconds.
    pub fn on_tts_playback_complete<F>(&self, callback: F)
    where
        F: Fn(u64) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static,
    {
        self.callbacks.write().on_tts_playback_complete = Some(Arc::new(callback));
    }

    /// Registers a callback for server-reported errors.
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static,
    {
        self.callbacks.write().on_error = Some(Arc::new(callback));
    }

    /// Connects to the server and sends the session configuration.
    ///
    /// Returns once the WebSocket is established and the `config` message
    /// has been queued. Readiness of the voice providers is signalled
    /// separately; use [`SaynaClient::wait_until_ready`] or an `on_ready`
    /// callback. Connecting while already connected is a no-op.
    pub async fn connect(&mut self, options: ConnectOptions) -> SaynaResult<()> {
        if self.ws_sender.is_some() {
            warn!("Already connected to Sayna WebSocket, ignoring connect()");
            return Ok(());
        }

        let audio = !options.text_only;
        if audio && (options.stt_config.is_none() || options.tts_config.is_none()) {
            return Err(SaynaError::Validation(
                "stt_config and tts_config are required when audio is enabled".to_string(),
            ));
        }

        let config_message = ClientMessage::Config {
            audio: Some(audio),
            stt_config: options.stt_config,
            tts_config: options.tts_config,
            livekit: options.livekit,
        };
        let config_json = serde_json::to_string(&config_message)
            .map_err(|e| SaynaError::Validation(format!("Failed to serialize config: {}", e)))?;

        let (ws_tx, mut ws_rx) = mpsc::unbounded_channel::<Message>();
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

        self.ws_sender = Some(ws_tx);
        self.shutdown_tx = Some(shutdown_tx);

        let state = self.state.clone();
        let ready = self.ready.clone();
        let callbacks = self.callbacks.clone();
        let ws_url = self.ws_url.to_string();
        let api_key = self.api_key.clone();

        let connection_handle = tokio::spawn(async move {
            {
                let mut state_guard = state.write().await;
                *state_guard = ConnectionState::Connecting;
            }

            let request = match build_handshake_request(&ws_url, api_key.as_deref()) {
                Ok(request) => request,
                Err(e) => {
                    error!("Failed to build WebSocket request: {}", e);
                    let mut state_guard = state.write().await;
                    *state_guard = ConnectionState::Error(e.to_string());
                    return;
                }
            };

            let (ws_stream, _) = match connect_async(request).await {
                Ok(result) => result,
                Err(e) => {
                    error!("Failed to connect to Sayna: {}", e);
                    let mut state_guard = state.write().await;
                    *state_guard = ConnectionState::Error(format!("Connection failed: {e}"));
                    return;
                }
            };

            info!(url = %ws_url, "Connected to Sayna WebSocket");

            let (mut ws_sink, mut ws_stream) = ws_stream.split();

            // Configuration must be the first message on the wire
            if let Err(e) = ws_sink.send(Message::text(config_json)).await {
                error!("Failed to send config message: {}", e);
                let mut state_guard = state.write().await;
                *state_guard = ConnectionState::Error(format!("Failed to send config: {e}"));
                return;
            }

            {
                let mut state_guard = state.write().await;
                *state_guard = ConnectionState::Connected;
            }

            loop {
                tokio::select! {
                    Some(message) = ws_rx.recv() => {
                        if let Err(e) = ws_sink.send(message).await {
                            error!("Failed to send WebSocket message: {}", e);
                            break;
                        }
                    }

                    message = ws_stream.next() => {
                        match message {
                            Some(Ok(msg)) => {
                                handle_server_message(msg, &ready, &callbacks).await;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error: {}", e);
                                break;
                            }
                            None => {
                                info!("WebSocket stream ended");
                                break;
                            }
                        }
                    }

                    _ = shutdown_rx.recv() => {
                        debug!("Received shutdown signal");
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            {
                let mut state_guard = state.write().await;
                *state_guard = ConnectionState::Disconnected;
            }
            {
                let mut ready_guard = ready.write().await;
                *ready_guard = None;
            }

            info!("Sayna WebSocket connection closed");
        });

        self.connection_handle = Some(connection_handle);

        // Wait for the connection task to either establish or fail
        let mut attempts = 0;
        while attempts < 50 {
            let state = self.state.read().await;
            match &*state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Error(message) => {
                    let message = message.clone();
                    drop(state);
                    self.reset();
                    return Err(SaynaError::Connection(message));
                }
                _ => {
                    drop(state);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    attempts += 1;
                }
            }
        }

        self.reset();
        Err(SaynaError::Connection("Connection timeout".to_string()))
    }

    /// Waits for the server's `ready` message, polling until `timeout`
    /// elapses.
    pub async fn wait_until_ready(&self, timeout: Duration) -> SaynaResult<ReadyInfo> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(info) = self.ready.read().await.clone() {
                return Ok(info);
            }
            if !self.is_connected() {
                return Err(SaynaError::NotConnected);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SaynaError::NotReady);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Closes the connection and stops the background task.
    pub async fn disconnect(&mut self) -> SaynaResult<()> {
        info!("Disconnecting from Sayna WebSocket");

        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(());
        }
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.await;
        }
        self.reset();

        let mut state_guard = self.state.write().await;
        *state_guard = ConnectionState::Disconnected;
        Ok(())
    }

    fn reset(&mut self) {
        self.ws_sender = None;
        self.shutdown_tx = None;
        self.connection_handle = None;
    }

    /// True once the WebSocket is established and the config message sent.
    pub fn is_connected(&self) -> bool {
        self.ws_sender.is_some()
    }

    /// True once the server has signalled that voice providers are ready.
    pub async fn is_ready(&self) -> bool {
        self.ready.read().await.is_some()
    }

    /// Session details from the `ready` message, if received.
    pub async fn ready_info(&self) -> Option<ReadyInfo> {
        self.ready.read().await.clone()
    }

    /// Queues text for speech synthesis and playback.
    ///
    /// `flush` forces immediate synthesis of buffered text;
    /// `allow_interruption` lets caller speech interrupt the playback.
    pub async fn speak(
        &self,
        text: &str,
        flush: bool,
        allow_interruption: bool,
    ) -> SaynaResult<()> {
        self.require_ready().await?;
        self.send_client_message(&ClientMessage::Speak {
            text: text.to_string(),
            flush: Some(flush),
            allow_interruption: Some(allow_interruption),
        })
    }

    /// Clears queued TTS audio and stops current playback.
    pub async fn clear(&self) -> SaynaResult<()> {
        self.require_ready().await?;
        self.send_client_message(&ClientMessage::Clear)
    }

    /// Sends a data message to other session participants. The topic
    /// defaults to `"messages"` when not given.
    pub async fn send_message(
        &self,
        message: &str,
        role: &str,
        topic: Option<&str>,
        debug: Option<serde_json::Value>,
    ) -> SaynaResult<()> {
        self.require_ready().await?;
        self.send_client_message(&ClientMessage::SendMessage {
            message: message.to_string(),
            role: role.to_string(),
            topic: Some(topic.unwrap_or("messages").to_string()),
            debug,
        })
    }

    /// Streams raw audio to the STT provider as a binary frame.
    pub async fn send_audio(&self, data: bytes::Bytes) -> SaynaResult<()> {
        self.require_ready().await?;
        let sender = self.ws_sender.as_ref().ok_or(SaynaError::NotConnected)?;
        sender
            .send(Message::binary(data))
            .map_err(|_| SaynaError::Connection("WebSocket send channel closed".to_string()))
    }

    fn send_client_message(&self, message: &ClientMessage) -> SaynaResult<()> {
        let sender = self.ws_sender.as_ref().ok_or(SaynaError::NotConnected)?;
        let json = serde_json::to_string(message)
            .map_err(|e| SaynaError::Validation(format!("Failed to serialize message: {}", e)))?;
        sender
            .send(Message::text(json))
            .map_err(|_| SaynaError::Connection("WebSocket send channel closed".to_string()))
    }

    async fn require_ready(&self) -> SaynaResult<()> {
        if !self.is_connected() {
            return Err(SaynaError::NotConnected);
        }
        if !self.is_ready().await {
            return Err(SaynaError::NotReady);
        }
        Ok(())
    }
}

fn derive_rest_base_url(ws_url: &Url) -> String {
    let mut url = ws_url.clone();
    let scheme = match url.scheme() {
        "wss" => "https",
        _ => "http",
    };
    url.set_query(None);
    url.set_fragment(None);
    // Url::set_scheme rejects ws->http, so rebuild the prefix textually
    let rest = url.as_str();
    let after_scheme = &rest[url.scheme().len()..];
    let after_scheme = after_scheme.trim_end_matches('/');
    let after_scheme = after_scheme.strip_suffix("/ws").unwrap_or(after_scheme);
    format!("{}{}", scheme, after_scheme)
}

fn build_handshake_request(
    ws_url: &str,
    api_key: Option<&str>,
) -> SaynaResult<tokio_tungstenite::tungstenite::handshake::client::Request> {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    let mut request = ws_url
        .into_client_request()
        .map_err(|e| SaynaError::Validation(format!("Invalid WebSocket URL: {}", e)))?;
    if let Some(key) = api_key {
        let value = format!("Bearer {key}")
            .parse()
            .map_err(|_| SaynaError::Validation("Invalid API key characters".to_string()))?;
        request.headers_mut().insert("Authorization", value);
    }
    Ok(request)
}

async fn handle_server_message(
    msg: Message,
    ready: &Arc<RwLock<Option<ReadyInfo>>>,
    callbacks: &Arc<SyncRwLock<Callbacks>>,
) {
    let text = match msg {
        Message::Text(text) => text,
        Message::Binary(data) => {
            debug!("Received audio frame: {} bytes", data.len());
            let callback = callbacks.read().on_audio.clone();
            if let Some(callback) = callback {
                callback(data).await;
            }
            return;
        }
        Message::Close(frame) => {
            info!("Server closed the connection: {:?}", frame);
            return;
        }
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return,
    };

    let parsed: ServerMessage = match serde_json::from_str(text.as_str()) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Failed to parse server message: {}", e);
            return;
        }
    };

    match parsed {
        ServerMessage::Ready {
            livekit_room_name,
            livekit_url,
            sayna_participant_identity,
            sayna_participant_name,
        } => {
            let info = ReadyInfo {
                livekit_room_name,
                livekit_url,
                sayna_participant_identity,
                sayna_participant_name,
            };
            {
                let mut ready_guard = ready.write().await;
                *ready_guard = Some(info.clone());
            }
            info!("Sayna voice providers ready");
            let callback = callbacks.read().on_ready.clone();
            if let Some(callback) = callback {
                callback(info).await;
            }
        }
        ServerMessage::STTResult {
            transcript,
            is_final,
            is_speech_final,
            confidence,
        } => {
            let callback = callbacks.read().on_stt_result.clone();
            if let Some(callback) = callback {
                callback(STTResult {
                    transcript,
                    is_final,
                    is_speech_final,
                    confidence,
                })
                .await;
            }
        }
        ServerMessage::Message { message } => {
            let callback = callbacks.read().on_message.clone();
            if let Some(callback) = callback {
                callback(message).await;
            }
        }
        ServerMessage::ParticipantDisconnected { participant } => {
            let callback = callbacks.read().on_participant_disconnected.clone();
            if let Some(callback) = callback {
                callback(participant).await;
            }
        }
        ServerMessage::TTSPlaybackComplete { timestamp } => {
            debug!(timestamp, "TTS playback complete");
            let callback = callbacks.read().on_tts_playback_complete.clone();
            if let Some(callback) = callback {
                callback(timestamp).await;
            }
        }
        ServerMessage::Error { message } => {
            warn!("Server error: {}", message);
            let callback = callbacks.read().on_error.clone();
            if let Some(callback) = callback {
                callback(message).await;
            }
        }
    }
}
