//! Inbound message dispatch
//!
//! Reads the mandatory `type` field, decodes the matching frame, and
//! reports schema violations as `MalformedMessage` so the caller can log
//! and move on. Unknown types and empty payloads are not errors.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

use super::messages::{
    AbortFrame, ErrorFrame, HelloFrame, ListenFrame, LlmFrame, SttFrame, TtsFrame,
};

/// A routed, field-checked inbound control message
#[derive(Debug, Clone)]
pub enum ServerMessage {
    Hello(HelloFrame),
    Listen(ListenFrame),
    Tts(TtsFrame),
    Stt(SttFrame),
    Llm(LlmFrame),
    Abort(AbortFrame),
    Error(ErrorFrame),
}

/// Parse one text payload into a routed message.
///
/// `Ok(None)` means there is nothing to handle: an empty payload or an
/// unknown type. `Err(MalformedMessage)` means the payload was invalid;
/// the dispatch loop stays usable either way.
pub fn parse(payload: &[u8]) -> ClientResult<Option<ServerMessage>> {
    if payload.is_empty() {
        debug!("empty message received");
        return Ok(None);
    }

    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| ClientError::MalformedMessage(format!("invalid json: {e}")))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::MalformedMessage("missing type field".to_string()))?;

    let message = match kind {
        "hello" => ServerMessage::Hello(decode(value)?),
        "listen" => ServerMessage::Listen(decode(value)?),
        "tts" => ServerMessage::Tts(decode(value)?),
        "stt" => ServerMessage::Stt(decode(value)?),
        "llm" => ServerMessage::Llm(decode(value)?),
        "abort" => ServerMessage::Abort(decode(value)?),
        "error" => ServerMessage::Error(decode(value)?),
        other => {
            warn!(kind = other, "unknown message type received");
            return Ok(None);
        }
    };

    Ok(Some(message))
}

fn decode<T: DeserializeOwned>(value: Value) -> ClientResult<T> {
    serde_json::from_value(value).map_err(|e| ClientError::MalformedMessage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_is_a_no_op() {
        assert!(parse(b"").unwrap().is_none());
    }

    #[test]
    fn test_missing_type_is_malformed() {
        let err = parse(b"{}").unwrap_err();
        assert!(matches!(err, ClientError::MalformedMessage(_)));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = parse(b"{not json").unwrap_err();
        assert!(matches!(err, ClientError::MalformedMessage(_)));
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        assert!(parse(br#"{"type":"weather"}"#).unwrap().is_none());
    }

    #[test]
    fn test_hello_requires_session_id() {
        let err = parse(br#"{"type":"hello"}"#).unwrap_err();
        assert!(matches!(err, ClientError::MalformedMessage(_)));

        let parsed = parse(br#"{"type":"hello","session_id":"abc"}"#).unwrap();
        match parsed {
            Some(ServerMessage::Hello(frame)) => assert_eq!(frame.session_id, "abc"),
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn test_stt_requires_both_fields() {
        let err = parse(br#"{"type":"stt","session_id":"s"}"#).unwrap_err();
        assert!(matches!(err, ClientError::MalformedMessage(_)));

        let err = parse(br#"{"type":"stt","text":"hi"}"#).unwrap_err();
        assert!(matches!(err, ClientError::MalformedMessage(_)));

        assert!(parse(br#"{"type":"stt","session_id":"s","text":"hi"}"#)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_error_requires_message_and_session_id() {
        let err = parse(br#"{"type":"error","message":"boom"}"#).unwrap_err();
        assert!(matches!(err, ClientError::MalformedMessage(_)));

        let parsed = parse(br#"{"type":"error","message":"boom","session_id":"s"}"#).unwrap();
        assert!(matches!(parsed, Some(ServerMessage::Error(_))));
    }

    #[test]
    fn test_abort_reason_is_optional() {
        let parsed = parse(br#"{"type":"abort"}"#).unwrap();
        match parsed {
            Some(ServerMessage::Abort(frame)) => assert!(frame.reason.is_none()),
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn test_parser_survives_bad_then_good_messages() {
        assert!(parse(br#"{"type":"llm","text":"no session"}"#).is_err());
        assert!(parse(br#"{"type":"abort"}"#).unwrap().is_some());
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let parsed =
            parse(br#"{"type":"hello","session_id":"abc","transport":"websocket","x":1}"#)
                .unwrap();
        assert!(matches!(parsed, Some(ServerMessage::Hello(_))));
    }
}
