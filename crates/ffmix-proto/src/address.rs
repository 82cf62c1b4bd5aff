//! Inbound address routing.
//!
//! Splits decoded OSC packets into the three reserved command addresses and
//! the default 1:1 parameter mapping. Bundles are flattened; only the first
//! message of a bundle is routed (the GUI never bundles).

use crate::value::Value;
use crate::ProtoError;

/// Snapshot management commands carried on `/state`.
#[derive(Debug, Clone, PartialEq)]
pub enum StateCommand {
    Save { name: String, omit_defaults: bool },
    Load { name: String },
    Delete { name: String },
    Reset,
}

/// Control-group clipboard commands carried on `/fx`.
///
/// The group names the daemon understands are `input-eq`, `output-eq`,
/// `input-dyn`, `output-dyn`, `reverb` and `echo`.
#[derive(Debug, Clone, PartialEq)]
pub enum FxCommand {
    Copy { group: String },
    Paste { group: String },
    Reset { group: String },
}

/// A routed inbound GUI message.
#[derive(Debug, Clone, PartialEq)]
pub enum GuiMessage {
    /// Client handshake: replay the full state.
    Connect,
    /// Snapshot command.
    State(StateCommand),
    /// FX clipboard command.
    Fx(FxCommand),
    /// Plain parameter write: `/name` with a flat value list.
    Param { name: String, value: Value },
}

pub(crate) fn route_packet(packet: rosc::OscPacket) -> Result<GuiMessage, ProtoError> {
    match packet {
        rosc::OscPacket::Message(msg) => route_message(msg),
        rosc::OscPacket::Bundle(bundle) => {
            let first = bundle
                .content
                .into_iter()
                .next()
                .ok_or(ProtoError::Decode("empty bundle".to_string()))?;
            route_packet(first)
        }
    }
}

fn route_message(msg: rosc::OscMessage) -> Result<GuiMessage, ProtoError> {
    match msg.addr.as_str() {
        "/connect" => Ok(GuiMessage::Connect),
        "/state" => parse_state(&msg.args).map(GuiMessage::State),
        "/fx" => parse_fx(&msg.args).map(GuiMessage::Fx),
        addr => {
            let name = addr.trim_start_matches('/').to_string();
            let value = Value::from_osc_args(&msg.args)?;
            Ok(GuiMessage::Param { name, value })
        }
    }
}

fn string_arg(args: &[rosc::OscType], idx: usize) -> Option<String> {
    match args.get(idx) {
        Some(rosc::OscType::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn parse_state(args: &[rosc::OscType]) -> Result<StateCommand, ProtoError> {
    let op = string_arg(args, 0).ok_or(ProtoError::BadCommand {
        addr: "/state",
        reason: "missing operation".to_string(),
    })?;
    let name = || {
        string_arg(args, 1).ok_or(ProtoError::BadCommand {
            addr: "/state",
            reason: format!("{op} requires a snapshot name"),
        })
    };
    match op.as_str() {
        "save" => {
            let omit_defaults = match args.get(2) {
                Some(rosc::OscType::Int(v)) => *v != 0,
                Some(rosc::OscType::Long(v)) => *v != 0,
                Some(rosc::OscType::Bool(b)) => *b,
                _ => false,
            };
            Ok(StateCommand::Save { name: name()?, omit_defaults })
        }
        "load" => Ok(StateCommand::Load { name: name()? }),
        "delete" => Ok(StateCommand::Delete { name: name()? }),
        "reset" => Ok(StateCommand::Reset),
        other => Err(ProtoError::BadCommand {
            addr: "/state",
            reason: format!("unknown operation {other}"),
        }),
    }
}

fn parse_fx(args: &[rosc::OscType]) -> Result<FxCommand, ProtoError> {
    let op = string_arg(args, 0).ok_or(ProtoError::BadCommand {
        addr: "/fx",
        reason: "missing operation".to_string(),
    })?;
    let group = string_arg(args, 1).ok_or(ProtoError::BadCommand {
        addr: "/fx",
        reason: "missing group".to_string(),
    })?;
    match op.as_str() {
        "copy" => Ok(FxCommand::Copy { group }),
        "paste" => Ok(FxCommand::Paste { group }),
        "reset" => Ok(FxCommand::Reset { group }),
        other => Err(ProtoError::BadCommand {
            addr: "/fx",
            reason: format!("unknown operation {other}"),
        }),
    }
}
