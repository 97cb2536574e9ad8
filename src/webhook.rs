//! Verification of signed SIP webhook deliveries.
//!
//! Sayna signs every webhook request with HMAC-SHA256 over the canonical
//! string `v1:{timestamp}:{event_id}:{body}` and sends the result in the
//! `X-Sayna-Signature` header as `v1=<64 hex chars>`. [`WebhookReceiver`]
//! recomputes the signature from the raw header values and the exact body
//! bytes, compares digests in constant time, and enforces a 5-minute
//! replay window before parsing the payload into a
//! [`WebhookSIPEvent`](crate::types::WebhookSIPEvent).
//!
//! Callers must pass the body exactly as received on the wire. Any
//! re-serialization (pretty-printing, key reordering) changes the signed
//! bytes and verification fails.

use hmac::{Hmac, Mac};
use http::HeaderMap;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::errors::{SaynaError, SaynaResult};
use crate::types::{WebhookSIPEvent, WebhookSIPParticipant, WebhookSIPRoom};

type HmacSha256 = Hmac<Sha256>;

/// Environment variable consulted when no secret is passed explicitly
pub const WEBHOOK_SECRET_ENV: &str = "SAYNA_WEBHOOK_SECRET";

const SIGNATURE_HEADER: &str = "x-sayna-signature";
const TIMESTAMP_HEADER: &str = "x-sayna-timestamp";
const EVENT_ID_HEADER: &str = "x-sayna-event-id";

const SIGNATURE_PREFIX: &str = "v1=";
const HEX_DIGEST_LEN: usize = 64;
const MIN_SECRET_LEN: usize = 16;
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Verifies signed webhook deliveries from the Sayna SIP forwarder.
///
/// Holds only the trimmed signing secret. Verification performs no I/O and
/// no locking, so a single receiver can serve concurrent requests.
///
/// ```no_run
/// use sayna_client::webhook::WebhookReceiver;
///
/// let receiver = WebhookReceiver::new(Some("my-webhook-secret-123"))?;
/// # let (headers, body) = (http::HeaderMap::new(), String::new());
/// let event = receiver.receive(&headers, &body)?;
/// println!("Call from {}", event.from_phone_number);
/// # Ok::<(), sayna_client::SaynaError>(())
/// ```
#[derive(Clone)]
pub struct WebhookReceiver {
    secret: String,
}

impl std::fmt::Debug for WebhookReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose the secret in logs
        f.debug_struct("WebhookReceiver").finish_non_exhaustive()
    }
}

impl WebhookReceiver {
    /// Creates a receiver from an explicit secret, falling back to the
    /// `SAYNA_WEBHOOK_SECRET` environment variable when `secret` is `None`.
    ///
    /// The secret is trimmed of surrounding whitespace and must be at least
    /// 16 characters long after trimming.
    pub fn new(secret: Option<&str>) -> SaynaResult<Self> {
        Self::with_env_lookup(secret, |name| std::env::var(name).ok())
    }

    /// Like [`WebhookReceiver::new`] but with an injected environment
    /// accessor, so construction can be tested without mutating process
    /// state.
    pub fn with_env_lookup<F>(secret: Option<&str>, env_lookup: F) -> SaynaResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = match secret {
            Some(s) => s.to_string(),
            None => env_lookup(WEBHOOK_SECRET_ENV).ok_or_else(|| {
                SaynaError::Validation(format!(
                    "Webhook secret is required. Pass it to WebhookReceiver::new or set the {} environment variable",
                    WEBHOOK_SECRET_ENV
                ))
            })?,
        };

        let trimmed = raw.trim();
        if trimmed.len() < MIN_SECRET_LEN {
            return Err(SaynaError::Validation(format!(
                "Webhook secret must be at least {} characters long, got {}. Generate one with: openssl rand -hex 32",
                MIN_SECRET_LEN,
                trimmed.len()
            )));
        }

        Ok(Self {
            secret: trimmed.to_string(),
        })
    }

    /// Verifies a webhook delivery and returns the parsed SIP event.
    ///
    /// `body` must be the exact body string as received over the wire.
    /// Every failure, whether a missing header, a stale timestamp, a
    /// signature mismatch, or a malformed payload, is reported as
    /// [`SaynaError::Validation`].
    pub fn receive(&self, headers: &HeaderMap, body: &str) -> SaynaResult<WebhookSIPEvent> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| SaynaError::Validation(format!("System clock error: {}", e)))?
            .as_secs() as i64;
        self.receive_at(headers, body, now)
    }

    fn receive_at(&self, headers: &HeaderMap, body: &str, now: i64) -> SaynaResult<WebhookSIPEvent> {
        let signature = required_header(headers, SIGNATURE_HEADER)?;
        let timestamp = required_header(headers, TIMESTAMP_HEADER)?;
        let event_id = required_header(headers, EVENT_ID_HEADER)?;

        let provided_digest = parse_signature(&signature)?;
        check_timestamp(&timestamp, now)?;

        let expected_digest = self.compute_digest(&timestamp, &event_id, body)?;

        // Both digests are 32 bytes here, so ct_eq compares every byte
        if !bool::from(expected_digest.ct_eq(&provided_digest)) {
            warn!(event_id = %event_id, "Webhook signature mismatch");
            return Err(SaynaError::Validation(
                "Signature verification failed: the payload may have been tampered with or the webhook secret is incorrect"
                    .to_string(),
            ));
        }

        debug!(event_id = %event_id, "Webhook signature verified");
        parse_event(body)
    }

    fn compute_digest(&self, timestamp: &str, event_id: &str, body: &str) -> SaynaResult<Vec<u8>> {
        // Raw header strings go into the canonical string, not parsed values
        let canonical_string = format!("v1:{}:{}:{}", timestamp, event_id, body);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| SaynaError::Validation(format!("HMAC initialization failed: {}", e)))?;
        mac.update(canonical_string.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Looks up a header case-insensitively, taking the first value when the
/// header repeats. Unreadable or empty values count as missing.
fn required_header(headers: &HeaderMap, name: &str) -> SaynaResult<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .ok_or_else(|| SaynaError::Validation(format!("Missing required header: {}", name)))
}

/// Checks the `v1=` prefix and hex shape, returning the decoded digest bytes.
fn parse_signature(signature: &str) -> SaynaResult<Vec<u8>> {
    let Some(candidate) = signature.strip_prefix(SIGNATURE_PREFIX) else {
        let shown: String = signature.chars().take(12).collect();
        return Err(SaynaError::Validation(format!(
            "Invalid signature format: expected '{}' prefix, got '{}'",
            SIGNATURE_PREFIX, shown
        )));
    };

    if candidate.len() != HEX_DIGEST_LEN || !candidate.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SaynaError::Validation(format!(
            "Invalid signature format: digest must be {} hex characters",
            HEX_DIGEST_LEN
        )));
    }

    hex::decode(candidate)
        .map_err(|e| SaynaError::Validation(format!("Invalid signature encoding: {}", e)))
}

/// Rejects deliveries outside the replay window, symmetrically in both
/// directions.
fn check_timestamp(raw: &str, now: i64) -> SaynaResult<()> {
    let timestamp: i64 = raw.parse().map_err(|_| {
        SaynaError::Validation(format!(
            "Invalid timestamp header '{}': expected a Unix timestamp in seconds",
            raw
        ))
    })?;

    let skew = (now - timestamp).abs();
    if skew > TIMESTAMP_TOLERANCE_SECS {
        return Err(SaynaError::Validation(format!(
            "Webhook timestamp is {}s away from the current time (max allowed: {}s). This may indicate a replayed request or clock skew",
            skew, TIMESTAMP_TOLERANCE_SECS
        )));
    }

    Ok(())
}

fn parse_event(body: &str) -> SaynaResult<WebhookSIPEvent> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| SaynaError::Validation(format!("Invalid JSON in webhook body: {}", e)))?;

    let root = value.as_object().ok_or_else(|| {
        SaynaError::Validation("Webhook payload must be a JSON object".to_string())
    })?;

    let participant_obj = required_object(root, "participant")?;
    let participant = WebhookSIPParticipant {
        identity: required_string(participant_obj, "participant.identity", "identity")?,
        sid: required_string(participant_obj, "participant.sid", "sid")?,
        name: optional_string(participant_obj, "participant.name", "name")?,
    };

    let room_obj = required_object(root, "room")?;
    let room = WebhookSIPRoom {
        name: required_string(room_obj, "room.name", "name")?,
        sid: required_string(room_obj, "room.sid", "sid")?,
    };

    let from_phone_number = required_string(root, "from_phone_number", "from_phone_number")?;
    let to_phone_number = required_string(root, "to_phone_number", "to_phone_number")?;
    let room_prefix = required_string(root, "room_prefix", "room_prefix")?;
    let sip_host = required_string(root, "sip_host", "sip_host")?;
    let sip_headers = parse_sip_headers(root)?;

    Ok(WebhookSIPEvent {
        participant,
        room,
        from_phone_number,
        to_phone_number,
        room_prefix,
        sip_host,
        sip_headers,
    })
}

fn required_object<'a>(
    parent: &'a serde_json::Map<String, Value>,
    path: &str,
) -> SaynaResult<&'a serde_json::Map<String, Value>> {
    match parent.get(path) {
        None => Err(SaynaError::Validation(format!(
            "Missing required field '{}'",
            path
        ))),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(SaynaError::Validation(format!(
            "Field '{}' must be a JSON object",
            path
        ))),
    }
}

fn required_string(
    parent: &serde_json::Map<String, Value>,
    path: &str,
    key: &str,
) -> SaynaResult<String> {
    match parent.get(key) {
        None => Err(SaynaError::Validation(format!(
            "Missing required field '{}'",
            path
        ))),
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(_) => Err(SaynaError::Validation(format!(
            "Field '{}' must be a non-empty string",
            path
        ))),
    }
}

fn optional_string(
    parent: &serde_json::Map<String, Value>,
    path: &str,
    key: &str,
) -> SaynaResult<Option<String>> {
    match parent.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(SaynaError::Validation(format!(
            "Field '{}' must be a string",
            path
        ))),
    }
}

fn parse_sip_headers(
    root: &serde_json::Map<String, Value>,
) -> SaynaResult<Option<HashMap<String, String>>> {
    match root.get("sip_headers") {
        None => Ok(None),
        Some(Value::Object(map)) => {
            let mut headers = HashMap::with_capacity(map.len());
            for (key, value) in map {
                let Value::String(s) = value else {
                    return Err(SaynaError::Validation(format!(
                        "Field 'sip_headers.{}' must be a string",
                        key
                    )));
                };
                headers.insert(key.clone(), s.clone());
            }
            Ok(Some(headers))
        }
        Some(_) => Err(SaynaError::Validation(
            "Field 'sip_headers' must be a plain object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use serde_json::json;

    const TEST_SECRET: &str = "test-secret-key-1234567890";

    fn sign(secret: &str, timestamp: &str, event_id: &str, body: &str) -> String {
        let canonical = format!("v1:{}:{}:{}", timestamp, event_id, body);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(canonical.as_bytes());
        format!("v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_headers(secret: &str, timestamp: &str, event_id: &str, body: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-sayna-signature",
            HeaderValue::from_str(&sign(secret, timestamp, event_id, body)).unwrap(),
        );
        headers.insert(
            "x-sayna-timestamp",
            HeaderValue::from_str(timestamp).unwrap(),
        );
        headers.insert("x-sayna-event-id", HeaderValue::from_str(event_id).unwrap());
        headers
    }

    fn now_secs() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn valid_body() -> String {
        json!({
            "participant": {
                "identity": "sip-participant-123",
                "sid": "PA_abc123",
                "name": "John Doe"
            },
            "room": {
                "name": "sip-test-room",
                "sid": "RM_xyz789"
            },
            "from_phone_number": "+15559876543",
            "to_phone_number": "+15551234567",
            "room_prefix": "sip-",
            "sip_host": "example.com"
        })
        .to_string()
    }

    fn receiver() -> WebhookReceiver {
        WebhookReceiver::new(Some(TEST_SECRET)).unwrap()
    }

    fn expect_validation_error(result: SaynaResult<WebhookSIPEvent>, needle: &str) {
        match result {
            Err(SaynaError::Validation(msg)) => {
                assert!(
                    msg.contains(needle),
                    "expected message containing {needle:?}, got {msg:?}"
                );
            }
            other => panic!("Expected validation error containing {needle:?}, got {other:?}"),
        }
    }

    // Construction

    #[test]
    fn test_new_with_explicit_secret() {
        assert!(WebhookReceiver::new(Some(TEST_SECRET)).is_ok());
    }

    #[test]
    fn test_new_without_secret_or_env_fails() {
        let result = WebhookReceiver::with_env_lookup(None, |_| None);
        match result {
            Err(SaynaError::Validation(msg)) => {
                assert!(msg.contains("SAYNA_WEBHOOK_SECRET"));
            }
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_new_falls_back_to_env_lookup() {
        let result = WebhookReceiver::with_env_lookup(None, |name| {
            assert_eq!(name, "SAYNA_WEBHOOK_SECRET");
            Some("env-sourced-secret-123".to_string())
        });
        assert!(result.is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let result = WebhookReceiver::new(Some("short"));
        match result {
            Err(SaynaError::Validation(msg)) => {
                assert!(msg.contains("at least 16 characters"));
                assert!(msg.contains("got 5"));
                assert!(msg.contains("openssl rand -hex 32"));
            }
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_secret_exactly_16_chars_accepted() {
        assert!(WebhookReceiver::new(Some("0123456789abcdef")).is_ok());
    }

    #[test]
    fn test_secret_trimmed_before_length_check() {
        // 16 chars after trim
        assert!(WebhookReceiver::new(Some("  0123456789abcdef  ")).is_ok());
        // 15 chars after trim, padded to more than 16
        assert!(WebhookReceiver::new(Some("   0123456789abcde   ")).is_err());
    }

    #[test]
    fn test_trimmed_secret_used_for_verification() {
        let body = valid_body();
        let ts = now_secs().to_string();
        let headers = signed_headers(TEST_SECRET, &ts, "evt_1", &body);

        let padded = WebhookReceiver::new(Some(&format!("  {}  ", TEST_SECRET))).unwrap();
        assert!(padded.receive(&headers, &body).is_ok());
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let formatted = format!("{:?}", receiver());
        assert!(!formatted.contains(TEST_SECRET));
    }

    // End-to-end verification

    #[test]
    fn test_valid_delivery_accepted() {
        let body = valid_body();
        let ts = now_secs().to_string();
        let headers = signed_headers(TEST_SECRET, &ts, "evt_12345", &body);

        let event = receiver().receive(&headers, &body).expect("Should verify");
        assert_eq!(event.participant.identity, "sip-participant-123");
        assert_eq!(event.participant.sid, "PA_abc123");
        assert_eq!(event.participant.name.as_deref(), Some("John Doe"));
        assert_eq!(event.room.name, "sip-test-room");
        assert_eq!(event.room.sid, "RM_xyz789");
        assert_eq!(event.from_phone_number, "+15559876543");
        assert_eq!(event.to_phone_number, "+15551234567");
        assert_eq!(event.room_prefix, "sip-");
        assert_eq!(event.sip_host, "example.com");
        assert!(event.sip_headers.is_none());
    }

    #[test]
    fn test_header_names_are_case_insensitive() {
        let body = valid_body();
        let ts = now_secs().to_string();
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Sayna-Signature",
            HeaderValue::from_str(&sign(TEST_SECRET, &ts, "evt_1", &body)).unwrap(),
        );
        headers.insert("X-Sayna-Timestamp", HeaderValue::from_str(&ts).unwrap());
        headers.insert("X-Sayna-Event-Id", HeaderValue::from_static("evt_1"));

        assert!(receiver().receive(&headers, &body).is_ok());
    }

    #[test]
    fn test_repeated_header_uses_first_value() {
        let body = valid_body();
        let ts = now_secs().to_string();
        let mut headers = signed_headers(TEST_SECRET, &ts, "evt_1", &body);
        headers.append("x-sayna-event-id", HeaderValue::from_static("evt_other"));

        assert!(receiver().receive(&headers, &body).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = valid_body();
        let ts = now_secs().to_string();
        let headers = signed_headers("wrong-secret-key", &ts, "evt_12345", &body);

        expect_validation_error(
            receiver().receive(&headers, &body),
            "Signature verification failed",
        );
    }

    #[test]
    fn test_tampered_body_rejected() {
        let body = valid_body();
        let ts = now_secs().to_string();
        let headers = signed_headers(TEST_SECRET, &ts, "evt_1", &body);

        let tampered = body.replace("+15559876543", "+15550000000");
        expect_validation_error(
            receiver().receive(&headers, &tampered),
            "Signature verification failed",
        );
    }

    #[test]
    fn test_tampered_timestamp_rejected() {
        let body = valid_body();
        let ts = now_secs().to_string();
        let mut headers = signed_headers(TEST_SECRET, &ts, "evt_1", &body);

        let shifted = (now_secs() + 1).to_string();
        headers.insert(
            "x-sayna-timestamp",
            HeaderValue::from_str(&shifted).unwrap(),
        );
        expect_validation_error(
            receiver().receive(&headers, &body),
            "Signature verification failed",
        );
    }

    #[test]
    fn test_tampered_event_id_rejected() {
        let body = valid_body();
        let ts = now_secs().to_string();
        let mut headers = signed_headers(TEST_SECRET, &ts, "evt_1", &body);
        headers.insert("x-sayna-event-id", HeaderValue::from_static("evt_2"));

        expect_validation_error(
            receiver().receive(&headers, &body),
            "Signature verification failed",
        );
    }

    // Headers

    #[test]
    fn test_missing_signature_header() {
        let body = valid_body();
        let ts = now_secs().to_string();
        let mut headers = signed_headers(TEST_SECRET, &ts, "evt_1", &body);
        headers.remove("x-sayna-signature");

        expect_validation_error(
            receiver().receive(&headers, &body),
            "Missing required header: x-sayna-signature",
        );
    }

    #[test]
    fn test_missing_timestamp_header() {
        let body = valid_body();
        let ts = now_secs().to_string();
        let mut headers = signed_headers(TEST_SECRET, &ts, "evt_1", &body);
        headers.remove("x-sayna-timestamp");

        expect_validation_error(
            receiver().receive(&headers, &body),
            "Missing required header: x-sayna-timestamp",
        );
    }

    #[test]
    fn test_missing_event_id_header() {
        let body = valid_body();
        let ts = now_secs().to_string();
        let mut headers = signed_headers(TEST_SECRET, &ts, "evt_1", &body);
        headers.remove("x-sayna-event-id");

        expect_validation_error(
            receiver().receive(&headers, &body),
            "Missing required header: x-sayna-event-id",
        );
    }

    #[test]
    fn test_empty_header_value_counts_as_missing() {
        let body = valid_body();
        let ts = now_secs().to_string();
        let mut headers = signed_headers(TEST_SECRET, &ts, "evt_1", &body);
        headers.insert("x-sayna-event-id", HeaderValue::from_static(""));

        expect_validation_error(
            receiver().receive(&headers, &body),
            "Missing required header: x-sayna-event-id",
        );
    }

    // Signature format

    #[test]
    fn test_signature_without_version_prefix() {
        let body = valid_body();
        let ts = now_secs().to_string();
        let mut headers = signed_headers(TEST_SECRET, &ts, "evt_1", &body);
        headers.insert(
            "x-sayna-signature",
            HeaderValue::from_static("sha256=deadbeef"),
        );

        expect_validation_error(receiver().receive(&headers, &body), "expected 'v1=' prefix");
    }

    #[test]
    fn test_signature_with_non_hex_digest() {
        let body = valid_body();
        let ts = now_secs().to_string();
        let mut headers = signed_headers(TEST_SECRET, &ts, "evt_1", &body);
        headers.insert(
            "x-sayna-signature",
            HeaderValue::from_static("v1=not-hex-characters-xyz"),
        );

        expect_validation_error(
            receiver().receive(&headers, &body),
            "must be 64 hex characters",
        );
    }

    #[test]
    fn test_signature_with_wrong_digest_length() {
        let body = valid_body();
        let ts = now_secs().to_string();
        let mut headers = signed_headers(TEST_SECRET, &ts, "evt_1", &body);
        headers.insert("x-sayna-signature", HeaderValue::from_static("v1=abc123"));

        expect_validation_error(
            receiver().receive(&headers, &body),
            "must be 64 hex characters",
        );
    }

    #[test]
    fn test_uppercase_hex_signature_accepted() {
        let body = valid_body();
        let ts = now_secs().to_string();
        let upper = sign(TEST_SECRET, &ts, "evt_1", &body).to_uppercase();
        // Keep the prefix lowercase, uppercase only the digest
        let upper = format!("v1={}", &upper[3..]);

        let mut headers = signed_headers(TEST_SECRET, &ts, "evt_1", &body);
        headers.insert("x-sayna-signature", HeaderValue::from_str(&upper).unwrap());

        assert!(receiver().receive(&headers, &body).is_ok());
    }

    // Timestamp window

    #[test]
    fn test_non_numeric_timestamp() {
        let body = valid_body();
        let headers = signed_headers(TEST_SECRET, "not-a-number", "evt_1", &body);

        expect_validation_error(
            receiver().receive(&headers, &body),
            "expected a Unix timestamp in seconds",
        );
    }

    #[test]
    fn test_timestamp_within_window_accepted() {
        let body = valid_body();
        let now = now_secs();
        for skew in [-299i64, 0, 299] {
            let ts = (now + skew).to_string();
            let headers = signed_headers(TEST_SECRET, &ts, "evt_1", &body);
            let result = receiver().receive_at(&headers, &body, now);
            assert!(result.is_ok(), "skew {skew}s should be accepted");
        }
    }

    #[test]
    fn test_timestamp_at_exact_tolerance_accepted() {
        let body = valid_body();
        let now = now_secs();
        for skew in [-300i64, 300] {
            let ts = (now + skew).to_string();
            let headers = signed_headers(TEST_SECRET, &ts, "evt_1", &body);
            let result = receiver().receive_at(&headers, &body, now);
            assert!(result.is_ok(), "skew {skew}s should be accepted");
        }
    }

    #[test]
    fn test_timestamp_past_tolerance_rejected() {
        let body = valid_body();
        let now = now_secs();
        for skew in [-301i64, 301] {
            let ts = (now + skew).to_string();
            let headers = signed_headers(TEST_SECRET, &ts, "evt_1", &body);
            let result = receiver().receive_at(&headers, &body, now);
            expect_validation_error(result, "301s");
        }
    }

    #[test]
    fn test_stale_timestamp_error_mentions_replay() {
        let body = valid_body();
        let now = now_secs();
        let ts = (now - 10_000).to_string();
        let headers = signed_headers(TEST_SECRET, &ts, "evt_1", &body);

        expect_validation_error(receiver().receive_at(&headers, &body, now), "replayed");
    }

    // Payload validation

    fn receive_body(body: &str) -> SaynaResult<WebhookSIPEvent> {
        let ts = now_secs().to_string();
        let headers = signed_headers(TEST_SECRET, &ts, "evt_1", body);
        receiver().receive(&headers, body)
    }

    #[test]
    fn test_invalid_json_body() {
        expect_validation_error(receive_body("{not json"), "Invalid JSON in webhook body");
    }

    #[test]
    fn test_non_object_payload() {
        expect_validation_error(receive_body("[1, 2, 3]"), "must be a JSON object");
        expect_validation_error(receive_body("\"hello\""), "must be a JSON object");
        expect_validation_error(receive_body("null"), "must be a JSON object");
    }

    #[test]
    fn test_missing_participant() {
        let mut payload: Value = serde_json::from_str(&valid_body()).unwrap();
        payload.as_object_mut().unwrap().remove("participant");
        expect_validation_error(
            receive_body(&payload.to_string()),
            "Missing required field 'participant'",
        );
    }

    #[test]
    fn test_participant_must_be_object() {
        let mut payload: Value = serde_json::from_str(&valid_body()).unwrap();
        payload["participant"] = json!("not-an-object");
        expect_validation_error(
            receive_body(&payload.to_string()),
            "Field 'participant' must be a JSON object",
        );
    }

    #[test]
    fn test_missing_participant_identity() {
        let mut payload: Value = serde_json::from_str(&valid_body()).unwrap();
        payload["participant"]
            .as_object_mut()
            .unwrap()
            .remove("identity");
        expect_validation_error(
            receive_body(&payload.to_string()),
            "Missing required field 'participant.identity'",
        );
    }

    #[test]
    fn test_empty_participant_identity() {
        let mut payload: Value = serde_json::from_str(&valid_body()).unwrap();
        payload["participant"]["identity"] = json!("");
        expect_validation_error(
            receive_body(&payload.to_string()),
            "Field 'participant.identity' must be a non-empty string",
        );
    }

    #[test]
    fn test_participant_name_optional_and_null_tolerated() {
        let mut payload: Value = serde_json::from_str(&valid_body()).unwrap();
        payload["participant"]
            .as_object_mut()
            .unwrap()
            .remove("name");
        let event = receive_body(&payload.to_string()).expect("Should verify");
        assert!(event.participant.name.is_none());

        payload["participant"]["name"] = json!(null);
        let event = receive_body(&payload.to_string()).expect("Should verify");
        assert!(event.participant.name.is_none());
    }

    #[test]
    fn test_participant_name_must_be_string_when_present() {
        let mut payload: Value = serde_json::from_str(&valid_body()).unwrap();
        payload["participant"]["name"] = json!(42);
        expect_validation_error(
            receive_body(&payload.to_string()),
            "Field 'participant.name' must be a string",
        );
    }

    #[test]
    fn test_missing_room_fields() {
        let mut payload: Value = serde_json::from_str(&valid_body()).unwrap();
        payload["room"].as_object_mut().unwrap().remove("sid");
        expect_validation_error(
            receive_body(&payload.to_string()),
            "Missing required field 'room.sid'",
        );
    }

    #[test]
    fn test_missing_top_level_strings() {
        for field in ["from_phone_number", "to_phone_number", "room_prefix", "sip_host"] {
            let mut payload: Value = serde_json::from_str(&valid_body()).unwrap();
            payload.as_object_mut().unwrap().remove(field);
            expect_validation_error(
                receive_body(&payload.to_string()),
                &format!("Missing required field '{}'", field),
            );
        }
    }

    #[test]
    fn test_sip_headers_accepted_shapes() {
        let mut payload: Value = serde_json::from_str(&valid_body()).unwrap();

        payload["sip_headers"] = json!({});
        let event = receive_body(&payload.to_string()).expect("Should verify");
        assert_eq!(event.sip_headers, Some(HashMap::new()));

        payload["sip_headers"] = json!({"to": "sip:user@example.com", "x-custom": "1"});
        let event = receive_body(&payload.to_string()).expect("Should verify");
        let headers = event.sip_headers.unwrap();
        assert_eq!(headers.get("to").unwrap(), "sip:user@example.com");
        assert_eq!(headers.get("x-custom").unwrap(), "1");
    }

    #[test]
    fn test_sip_headers_rejected_shapes() {
        for bad in [json!([]), json!("text"), json!(7), json!(null)] {
            let mut payload: Value = serde_json::from_str(&valid_body()).unwrap();
            payload["sip_headers"] = bad;
            expect_validation_error(
                receive_body(&payload.to_string()),
                "Field 'sip_headers' must be a plain object",
            );
        }
    }

    #[test]
    fn test_sip_headers_value_must_be_string() {
        let mut payload: Value = serde_json::from_str(&valid_body()).unwrap();
        payload["sip_headers"] = json!({"to": 123});
        expect_validation_error(
            receive_body(&payload.to_string()),
            "Field 'sip_headers.to' must be a string",
        );
    }

    // Pipeline ordering

    #[test]
    fn test_missing_header_reported_before_bad_signature() {
        // Both the timestamp header and the signature are wrong; the header
        // error must win because extraction runs first
        let body = valid_body();
        let mut headers = HeaderMap::new();
        headers.insert("x-sayna-signature", HeaderValue::from_static("garbage"));
        headers.insert("x-sayna-event-id", HeaderValue::from_static("evt_1"));

        expect_validation_error(
            receiver().receive(&headers, &body),
            "Missing required header: x-sayna-timestamp",
        );
    }

    #[test]
    fn test_signature_format_checked_before_timestamp_window() {
        let body = valid_body();
        let stale = (now_secs() - 10_000).to_string();
        let mut headers = signed_headers(TEST_SECRET, &stale, "evt_1", &body);
        headers.insert(
            "x-sayna-signature",
            HeaderValue::from_static("v1=not-hex-characters-xyz"),
        );

        expect_validation_error(
            receiver().receive(&headers, &body),
            "must be 64 hex characters",
        );
    }

    #[test]
    fn test_signature_verified_before_payload_parsed() {
        // Invalid JSON with a wrong signature must report the signature
        // failure, not the parse failure
        let body = "{not json";
        let ts = now_secs().to_string();
        let headers = signed_headers("wrong-secret-key", &ts, "evt_1", body);

        expect_validation_error(
            receiver().receive(&headers, body),
            "Signature verification failed",
        );
    }
}
