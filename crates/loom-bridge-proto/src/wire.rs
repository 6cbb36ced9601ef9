// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Deterministic framing and CBOR helpers for the bridge ↔ host socket.
//!
//! Packet layout:
//!
//! ``MAGIC(4) || VERSION(2) || FLAGS(2) || LENGTH(4) || PAYLOAD || CHECKSUM(32)``
//!
//! * PAYLOAD is a CBOR [`OpEnvelope`]
//! * CHECKSUM = blake3-256 over HEADER (first 12 bytes) || PAYLOAD
//!
//! Every request carries a sequence number that its response echoes.

use blake3::Hasher;
use ciborium::value::Value;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::{Instance, LogLevel, PluginEvent, Properties, ReconcilerMode, UpdatePayload, WidgetId};

/// Protocol magic constant "LOOM".
pub const MAGIC: [u8; 4] = *b"LOOM";
/// Wire protocol version (big-endian u16).
pub const VERSION: u16 = 0x0001;
/// Reserved flags (set to zero for v1).
pub const FLAGS: u16 = 0x0000;
/// Fixed header size.
pub const HEADER_BYTES: usize = 12;
/// Trailing checksum size.
pub const CHECKSUM_BYTES: usize = 32;
/// Largest payload a peer will accept.
pub const MAX_PAYLOAD: usize = 8 * 1024 * 1024;

/// Error code: an operation referenced an instance the host does not know.
pub const E_UNKNOWN_HANDLE: u32 = 1;
/// Error code: no view is mounted.
pub const E_NO_VIEW: u32 = 2;
/// Error code: request was malformed or not valid for this connection.
pub const E_BAD_REQUEST: u32 = 3;
/// Error code: a `next_plugin_event` call is already outstanding.
pub const E_BUSY: u32 = 4;
/// Error code: host-side failure.
pub const E_INTERNAL: u32 = 500;

/// Framing and encoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Fewer bytes than the header announces.
    #[error("incomplete packet")]
    Incomplete,
    /// Header does not start with [`MAGIC`].
    #[error("bad magic")]
    BadMagic,
    /// Peer speaks another protocol version.
    #[error("unsupported version {0}")]
    UnsupportedVersion(u16),
    /// blake3 checksum did not match.
    #[error("checksum mismatch")]
    ChecksumMismatch,
    /// Announced payload exceeds [`MAX_PAYLOAD`].
    #[error("payload of {0} bytes exceeds limit")]
    PayloadTooLarge(usize),
    /// CBOR encode/decode failure.
    #[error("cbor error: {0}")]
    Cbor(String),
    /// Envelope carried an op this side does not speak.
    #[error("unknown op {0}")]
    UnknownOp(String),
}

/// Envelope carried as the payload of every packet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpEnvelope<P> {
    /// Operation name (e.g. "clone_instance", "plugin_event").
    pub op: String,
    /// Request sequence number; responses echo it.
    pub seq: u64,
    /// Operation-specific body.
    pub payload: P,
}

/// Error payload of an `error` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    /// Numeric code (`E_*` constants).
    pub code: u32,
    /// Stable identifier, e.g. "E_UNKNOWN_HANDLE".
    pub name: String,
    /// Human readable message.
    pub message: String,
}

impl ErrorPayload {
    /// Build a payload for one of the `E_*` codes.
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        let name = match code {
            E_UNKNOWN_HANDLE => "E_UNKNOWN_HANDLE",
            E_NO_VIEW => "E_NO_VIEW",
            E_BAD_REQUEST => "E_BAD_REQUEST",
            E_BUSY => "E_BUSY",
            _ => "E_INTERNAL",
        };
        Self {
            code,
            name: name.to_owned(),
            message: message.into(),
        }
    }
}

/// Body of a `log` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogPayload {
    /// Severity.
    pub level: LogLevel,
    /// Logical source, e.g. a plugin module.
    pub target: String,
    /// Message text.
    pub message: String,
}

/// Body of a `call_event_listener` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallEventListenerPayload {
    /// Target instance.
    pub widget_id: WidgetId,
    /// Listener name.
    pub event_name: String,
}

/// Body of a `clone_instance` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloneInstancePayload {
    /// Source instance.
    pub widget_id: WidgetId,
    /// Keys that changed.
    pub update_payload: UpdatePayload,
    /// Component type of the clone.
    pub widget_type: String,
    /// Properties before the commit.
    pub old_props: Properties,
    /// Properties after the commit.
    pub new_props: Properties,
    /// Keep the source's children (true) or start empty (false).
    pub keep_children: bool,
}

/// Body of a `replace_container_children` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplaceChildrenPayload {
    /// Container whose child list is replaced.
    pub container_id: WidgetId,
    /// New ordered children (full subtrees).
    pub children: Vec<Instance>,
}

/// Body of an `open_view` control request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenViewPayload {
    /// Mode announced in the resulting `ViewCreated`.
    pub reconciler_mode: ReconcilerMode,
    /// View name announced in the resulting `ViewCreated`.
    pub view_name: String,
}

/// Body of a `fire_event` control request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FireEventPayload {
    /// Widget the simulated interaction targets.
    pub widget_id: WidgetId,
    /// Event name, e.g. "onPress".
    pub event_name: String,
}

#[derive(Serialize, Deserialize)]
struct TreePayload {
    root: Option<Instance>,
}

#[derive(Serialize, Deserialize)]
struct Empty {}

/// Every message the bridge, the host and control clients exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Forward a log line to the host sink (op = "log").
    Log(LogPayload),
    /// Ask the host to invoke a widget's listener (op = "call_event_listener").
    CallEventListener(CallEventListenerPayload),
    /// Ask the host for a re-propped copy of an instance (op = "clone_instance").
    CloneInstance(CloneInstancePayload),
    /// Replace a container's full child list (op = "replace_container_children").
    ReplaceContainerChildren(ReplaceChildrenPayload),
    /// Fetch the current view's root container (op = "get_container").
    GetContainer,
    /// Suspend until the host emits the next plugin event (op = "next_plugin_event").
    NextPluginEvent,
    /// Control: mount a view and emit `ViewCreated` (op = "open_view").
    OpenView(OpenViewPayload),
    /// Control: tear the view down and emit `ViewDestroyed` (op = "close_view").
    CloseView,
    /// Control: simulate a user interaction (op = "fire_event").
    FireEvent(FireEventPayload),
    /// Control: emit the stop command (op = "stop").
    Stop,
    /// Control: return the current native tree (op = "dump_tree").
    DumpTree,
    /// Empty success response (op = "ok").
    Ok,
    /// Instance response (op = "instance").
    Instance(Instance),
    /// Event response to `next_plugin_event` (op = "plugin_event").
    PluginEvent(PluginEvent),
    /// Tree response to `dump_tree` (op = "tree").
    Tree(Option<Instance>),
    /// Failure response (op = "error").
    Error(ErrorPayload),
}

impl Message {
    /// Canonical op string for this message variant.
    pub fn op_name(&self) -> &'static str {
        match self {
            Message::Log(_) => "log",
            Message::CallEventListener(_) => "call_event_listener",
            Message::CloneInstance(_) => "clone_instance",
            Message::ReplaceContainerChildren(_) => "replace_container_children",
            Message::GetContainer => "get_container",
            Message::NextPluginEvent => "next_plugin_event",
            Message::OpenView(_) => "open_view",
            Message::CloseView => "close_view",
            Message::FireEvent(_) => "fire_event",
            Message::Stop => "stop",
            Message::DumpTree => "dump_tree",
            Message::Ok => "ok",
            Message::Instance(_) => "instance",
            Message::PluginEvent(_) => "plugin_event",
            Message::Tree(_) => "tree",
            Message::Error(_) => "error",
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, WireError> {
    Value::serialized(value).map_err(|e| WireError::Cbor(e.to_string()))
}

fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T, WireError> {
    value.deserialized().map_err(|e| WireError::Cbor(e.to_string()))
}

/// Encode to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).map_err(|e| WireError::Cbor(e.to_string()))?;
    Ok(out)
}

/// Decode from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    ciborium::de::from_reader(bytes).map_err(|e| WireError::Cbor(e.to_string()))
}

/// A full packet (header + payload + checksum).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Raw header (12 bytes).
    pub header: [u8; HEADER_BYTES],
    /// CBOR payload bytes.
    pub payload: Vec<u8>,
    /// blake3 checksum over header||payload.
    pub checksum: [u8; CHECKSUM_BYTES],
}

impl Packet {
    /// Build a packet from a CBOR payload.
    pub fn from_payload(payload: Vec<u8>) -> Result<Self, WireError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(WireError::PayloadTooLarge(payload.len()));
        }
        let len = u32::try_from(payload.len()).map_err(|_| WireError::PayloadTooLarge(payload.len()))?;
        let mut header = [0u8; HEADER_BYTES];
        header[0..4].copy_from_slice(&MAGIC);
        header[4..6].copy_from_slice(&VERSION.to_be_bytes());
        header[6..8].copy_from_slice(&FLAGS.to_be_bytes());
        header[8..12].copy_from_slice(&len.to_be_bytes());

        let mut hasher = Hasher::new();
        hasher.update(&header);
        hasher.update(&payload);
        let checksum = *hasher.finalize().as_bytes();

        Ok(Packet {
            header,
            payload,
            checksum,
        })
    }

    /// Concatenate header, payload and checksum.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_BYTES + self.payload.len() + CHECKSUM_BYTES);
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&self.checksum);
        out
    }
}

/// Validate a header and return the total packet length it announces.
///
/// Stream readers use this to know how many more bytes to wait for.
pub fn packet_len(header: &[u8; HEADER_BYTES]) -> Result<usize, WireError> {
    if header[0..4] != MAGIC {
        return Err(WireError::BadMagic);
    }
    let version = u16::from_be_bytes([header[4], header[5]]);
    if version != VERSION {
        return Err(WireError::UnsupportedVersion(version));
    }
    let len = u32::from_be_bytes([header[8], header[9], header[10], header[11]]) as usize;
    if len > MAX_PAYLOAD {
        return Err(WireError::PayloadTooLarge(len));
    }
    Ok(HEADER_BYTES + len + CHECKSUM_BYTES)
}

/// Encode an envelope into a full packet byte vector.
pub fn encode_envelope<P: Serialize>(env: &OpEnvelope<P>) -> Result<Vec<u8>, WireError> {
    Ok(Packet::from_payload(to_cbor(env)?)?.into_bytes())
}

/// Decode a packet, returning the envelope and bytes consumed.
pub fn decode_envelope<P: DeserializeOwned>(bytes: &[u8]) -> Result<(OpEnvelope<P>, usize), WireError> {
    if bytes.len() < HEADER_BYTES + CHECKSUM_BYTES {
        return Err(WireError::Incomplete);
    }
    let mut header = [0u8; HEADER_BYTES];
    header.copy_from_slice(&bytes[..HEADER_BYTES]);
    let total = packet_len(&header)?;
    if bytes.len() < total {
        return Err(WireError::Incomplete);
    }
    let payload = &bytes[HEADER_BYTES..total - CHECKSUM_BYTES];
    let checksum = &bytes[total - CHECKSUM_BYTES..total];

    let mut hasher = Hasher::new();
    hasher.update(&header);
    hasher.update(payload);
    if hasher.finalize().as_bytes() != checksum {
        return Err(WireError::ChecksumMismatch);
    }

    let env: OpEnvelope<P> = from_cbor(payload)?;
    Ok((env, total))
}

/// Encode a `Message` into a packet with the given sequence number.
pub fn encode_message(msg: &Message, seq: u64) -> Result<Vec<u8>, WireError> {
    let payload = match msg {
        Message::Log(p) => to_value(p)?,
        Message::CallEventListener(p) => to_value(p)?,
        Message::CloneInstance(p) => to_value(p)?,
        Message::ReplaceContainerChildren(p) => to_value(p)?,
        Message::OpenView(p) => to_value(p)?,
        Message::FireEvent(p) => to_value(p)?,
        Message::Instance(i) => to_value(i)?,
        Message::PluginEvent(e) => e.to_value()?,
        Message::Tree(root) => to_value(&TreePayload { root: root.clone() })?,
        Message::Error(p) => to_value(p)?,
        Message::GetContainer
        | Message::NextPluginEvent
        | Message::CloseView
        | Message::Stop
        | Message::DumpTree
        | Message::Ok => to_value(&Empty {})?,
    };
    encode_envelope(&OpEnvelope {
        op: msg.op_name().to_owned(),
        seq,
        payload,
    })
}

/// Decode bytes into (Message, seq, bytes_consumed).
pub fn decode_message(bytes: &[u8]) -> Result<(Message, u64, usize), WireError> {
    let (env, used) = decode_envelope::<Value>(bytes)?;
    let p = &env.payload;
    let msg = match env.op.as_str() {
        "log" => Message::Log(from_value(p)?),
        "call_event_listener" => Message::CallEventListener(from_value(p)?),
        "clone_instance" => Message::CloneInstance(from_value(p)?),
        "replace_container_children" => Message::ReplaceContainerChildren(from_value(p)?),
        "get_container" => Message::GetContainer,
        "next_plugin_event" => Message::NextPluginEvent,
        "open_view" => Message::OpenView(from_value(p)?),
        "close_view" => Message::CloseView,
        "fire_event" => Message::FireEvent(from_value(p)?),
        "stop" => Message::Stop,
        "dump_tree" => Message::DumpTree,
        "ok" => Message::Ok,
        "instance" => Message::Instance(from_value(p)?),
        "plugin_event" => Message::PluginEvent(PluginEvent::from_value(p)),
        "tree" => Message::Tree(from_value::<TreePayload>(p)?.root),
        "error" => Message::Error(from_value(p)?),
        other => return Err(WireError::UnknownOp(other.to_owned())),
    };
    Ok((msg, env.seq, used))
}

// --- Unit tests -----------------------------------------------------------
