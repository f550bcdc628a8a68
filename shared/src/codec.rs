//! JSON codec for channel payloads
//!
//! Inbound payloads are classified in two steps: the `msg_type` tag is matched
//! against the closed [`MessageKind`] set, then `args` is decoded into that
//! kind's argument type. An unknown tag and bad arguments for a known tag are
//! distinct errors.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::message::{
    ArmArgs, CommandMessage, InitConnectionArgs, MessageKind, MoveArgs, OutboundMessage,
    SetModeArgs, TakeoffArgs,
};

/// Maximum payload size accepted from the channel
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Payload too large: {0} bytes (max: {MAX_PAYLOAD_SIZE})")]
    PayloadTooLarge(usize),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Unrecognized message type: {0:?}")]
    UnrecognizedMessageType(String),

    #[error("Invalid arguments for {kind}: {reason}")]
    InvalidArguments { kind: MessageKind, reason: String },

    #[error("JSON encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CodecError {
    /// The tag this error refers to, when one could be read
    pub fn tag(&self) -> Option<String> {
        match self {
            CodecError::UnrecognizedMessageType(tag) => Some(tag.clone()),
            CodecError::InvalidArguments { kind, .. } => Some(kind.to_string()),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct RawMessage {
    msg_type: String,
    #[serde(default)]
    args: Value,
}

/// Classify and decode an inbound payload
pub fn decode(payload: &[u8]) -> Result<CommandMessage, CodecError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }

    let raw: RawMessage = serde_json::from_slice(payload)
        .map_err(|e| CodecError::MalformedPayload(e.to_string()))?;

    let kind: MessageKind = raw
        .msg_type
        .parse()
        .map_err(CodecError::UnrecognizedMessageType)?;

    let args = match raw.args {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };

    let message = match kind {
        MessageKind::InitConnection => {
            let init: InitConnectionArgs = decode_args(kind, args)?;
            if init.heartbeat_interval == 0 || init.state_interval == 0 {
                return Err(CodecError::InvalidArguments {
                    kind,
                    reason: "intervals must be greater than zero".into(),
                });
            }
            CommandMessage::InitConnection(init)
        }
        MessageKind::Arm => CommandMessage::Arm(decode_args::<ArmArgs>(kind, args)?),
        MessageKind::Disarm => CommandMessage::Disarm(decode_args::<ArmArgs>(kind, args)?),
        MessageKind::Takeoff => CommandMessage::Takeoff(decode_args::<TakeoffArgs>(kind, args)?),
        MessageKind::Land => CommandMessage::Land,
        MessageKind::Move => CommandMessage::Move(decode_args::<MoveArgs>(kind, args)?),
        MessageKind::SetMode => CommandMessage::SetMode(decode_args::<SetModeArgs>(kind, args)?),
        MessageKind::Heartbeat => CommandMessage::Heartbeat,
        MessageKind::EndConnection => CommandMessage::EndConnection,
    };

    Ok(message)
}

fn decode_args<T: DeserializeOwned>(kind: MessageKind, args: Value) -> Result<T, CodecError> {
    serde_json::from_value(args).map_err(|e| CodecError::InvalidArguments {
        kind,
        reason: e.to_string(),
    })
}

/// Encode an outbound message
pub fn encode(message: &OutboundMessage) -> Result<Bytes, CodecError> {
    Ok(Bytes::from(serde_json::to_vec(message)?))
}

/// Encode a command, as an operator would send it
pub fn encode_command(message: &CommandMessage) -> Result<Bytes, CodecError> {
    Ok(Bytes::from(serde_json::to_vec(message)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{OutboundMessage, TelemetrySample};

    #[test]
    fn test_decode_init_connection() {
        let msg = decode(
            br#"{"msg_type":"init_connection","args":{"heartbeat_interval":500,"state_interval":200}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            CommandMessage::InitConnection(InitConnectionArgs {
                heartbeat_interval: 500,
                state_interval: 200,
            })
        );
    }

    #[test]
    fn test_decode_force_defaults_to_false() {
        let msg = decode(br#"{"msg_type":"arm","args":{}}"#).unwrap();
        assert_eq!(msg, CommandMessage::Arm(ArmArgs { force: false }));

        let msg = decode(br#"{"msg_type":"disarm","args":{"force":true}}"#).unwrap();
        assert_eq!(msg, CommandMessage::Disarm(ArmArgs { force: true }));
    }

    #[test]
    fn test_decode_without_args() {
        assert_eq!(decode(br#"{"msg_type":"land"}"#).unwrap(), CommandMessage::Land);
        assert_eq!(
            decode(br#"{"msg_type":"heartbeat","args":null}"#).unwrap(),
            CommandMessage::Heartbeat
        );
        assert_eq!(
            decode(br#"{"msg_type":"end_connection"}"#).unwrap(),
            CommandMessage::EndConnection
        );
    }

    #[test]
    fn test_decode_move_with_optional_velocity() {
        let msg = decode(br#"{"msg_type":"move","args":{"lat":47.39,"lon":8.54,"alt":20.0}}"#)
            .unwrap();
        match msg {
            CommandMessage::Move(args) => {
                assert_eq!(args.lat, 47.39);
                assert_eq!(args.alt, 20.0);
                assert_eq!(args.vx, 0.0);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_unknown_tag_is_classification_error() {
        let err = decode(br#"{"msg_type":"reboot","args":{}}"#).unwrap_err();
        assert!(matches!(err, CodecError::UnrecognizedMessageType(ref t) if t == "reboot"));
        assert_eq!(err.tag().as_deref(), Some("reboot"));
    }

    #[test]
    fn test_tags_are_case_sensitive() {
        let err = decode(br#"{"msg_type":"ARM"}"#).unwrap_err();
        assert!(matches!(err, CodecError::UnrecognizedMessageType(_)));
    }

    #[test]
    fn test_bad_arguments_for_known_tag() {
        let err = decode(br#"{"msg_type":"takeoff","args":{"altitude":"high"}}"#).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidArguments {
                kind: MessageKind::Takeoff,
                ..
            }
        ));

        let err = decode(br#"{"msg_type":"set_mode","args":{}}"#).unwrap_err();
        assert!(matches!(err, CodecError::InvalidArguments { .. }));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = decode(
            br#"{"msg_type":"init_connection","args":{"heartbeat_interval":0,"state_interval":200}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::InvalidArguments { .. }));
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(
            decode(b"not json").unwrap_err(),
            CodecError::MalformedPayload(_)
        ));
        assert!(matches!(
            decode(br#"{"args":{}}"#).unwrap_err(),
            CodecError::MalformedPayload(_)
        ));
    }

    #[test]
    fn test_oversized_payload() {
        let payload = vec![b' '; MAX_PAYLOAD_SIZE + 1];
        assert!(matches!(
            decode(&payload).unwrap_err(),
            CodecError::PayloadTooLarge(_)
        ));
    }

    #[test]
    fn test_encoded_command_decodes() {
        let msg = CommandMessage::SetMode(SetModeArgs {
            mode: "GUIDED".into(),
        });
        let bytes = encode_command(&msg).unwrap();
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_encode_state() {
        let sample = TelemetrySample::new(10.0, 20.0, 5.5).unwrap();
        let bytes = encode(&OutboundMessage::State(sample)).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["msg_type"], "state");
        assert_eq!(value["args"]["lon"], 20.0);
    }
}
