//! ffmix-proto - Protocol types for the ffmix GUI control surface
//!
//! This crate defines the message model exchanged between the ffmix daemon
//! and its OSC GUI. Every mixer parameter is addressed as `/name` where
//! `name` is the daemon-side parameter name (colon-segmented, usually ending
//! in a channel index). Values are always flat scalar lists matching the
//! parameter's declared type signature.
//!
//! Three reserved addresses carry commands rather than values:
//! - `/connect` - a client finished its handshake and wants a full replay
//! - `/state` - snapshot management (save/load/delete/reset)
//! - `/fx` - control-group clipboard (copy/paste/reset)
//!
//! The wire format is plain OSC over UDP via `rosc`. The daemon side is
//! best-effort and unidirectional: malformed packets and unknown addresses
//! are dropped, never answered with errors.

pub mod address;
pub mod value;

pub use address::{FxCommand, GuiMessage, StateCommand};
pub use value::{Kind, Signature, Value};

use thiserror::Error;

/// Protocol decode errors.
///
/// These are only ever logged; the GUI link never reports errors back.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("empty argument list")]
    EmptyArgs,

    #[error("mixed scalar types in argument list")]
    MixedTypes,

    #[error("unsupported OSC argument type: {0}")]
    UnsupportedType(&'static str),

    #[error("malformed {addr} command: {reason}")]
    BadCommand { addr: &'static str, reason: String },

    #[error("failed to decode OSC packet: {0}")]
    Decode(String),
}

/// Decode a raw UDP datagram into a routed GUI message.
pub fn decode(buf: &[u8]) -> Result<GuiMessage, ProtoError> {
    let (_, packet) = rosc::decoder::decode_udp(buf).map_err(|e| ProtoError::Decode(e.to_string()))?;
    address::route_packet(packet)
}

/// Encode a parameter update as an OSC datagram.
pub fn encode_param(name: &str, value: &Value) -> Vec<u8> {
    let msg = rosc::OscMessage {
        addr: format!("/{name}"),
        args: value.to_osc_args(),
    };
    // encoding a well-formed message cannot fail
    rosc::encoder::encode(&rosc::OscPacket::Message(msg)).unwrap_or_default()
}

/// Encode the meter fast path: a `/SCRIPT` call that sets the widget value
/// with echo and sync disabled, so the GUI never writes the value back.
pub fn encode_script_set(name: &str, value: &Value) -> Vec<u8> {
    let rendered = match value {
        Value::Int(v) => v.first().map(|x| x.to_string()).unwrap_or_default(),
        Value::Float(v) => v.first().map(|x| x.to_string()).unwrap_or_default(),
        Value::Str(v) => format!("\"{}\"", v.first().cloned().unwrap_or_default()),
    };
    let msg = rosc::OscMessage {
        addr: "/SCRIPT".to_string(),
        args: vec![rosc::OscType::String(format!(
            "set(\"{name}\", {rendered}, {{sync: false, send: false}})"
        ))],
    };
    rosc::encoder::encode(&rosc::OscPacket::Message(msg)).unwrap_or_default()
}

/// Encode a `/NOTIFY` toast for the GUI (icon name + message).
pub fn encode_notify(icon: &str, text: &str) -> Vec<u8> {
    let msg = rosc::OscMessage {
        addr: "/NOTIFY".to_string(),
        args: vec![
            rosc::OscType::String(icon.to_string()),
            rosc::OscType::String(text.to_string()),
        ],
    };
    rosc::encoder::encode(&rosc::OscPacket::Message(msg)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_roundtrip() {
        let buf = encode_param("output:volume-db:3", &Value::float(-12.5));
        let msg = decode(&buf).unwrap();
        match msg {
            GuiMessage::Param { name, value } => {
                assert_eq!(name, "output:volume-db:3");
                assert_eq!(value, Value::float(-12.5));
            }
            other => panic!("unexpected route: {other:?}"),
        }
    }

    #[test]
    fn test_script_set_disables_echo() {
        let buf = encode_script_set("output:meter:0", &Value::float(-37.2));
        let text = String::from_utf8_lossy(&buf);
        assert!(text.contains("sync: false"));
        assert!(text.contains("send: false"));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(decode(&[0x00, 0x01, 0x02]).is_err());
    }
}
