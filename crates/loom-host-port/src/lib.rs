// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Port contract between the renderer bridge and its native host.
//!
//! This crate defines the two channels the bridge consumes and nothing else.
//! Transports (sockets, in-process hosts) live in their own crates.
//!
//! # Design Principles
//!
//! - **Hosts own instances**: The bridge holds handles and asks the host to
//!   produce new ones; it never builds host state itself.
//! - **Two channels, no shared ordering**: Gateway calls are synchronous
//!   request/response; plugin events arrive on a separate single-flight stream.
//! - **Forward compatible events**: Unknown event tags are data, not errors.

use loom_bridge_proto::wire::{ErrorPayload, WireError, E_NO_VIEW, E_UNKNOWN_HANDLE};
use loom_bridge_proto::WidgetId;
use thiserror::Error;

mod port;

pub use loom_bridge_proto::LogLevel;
pub use port::{EventSource, HostGateway};

/// Failure of the channel itself (socket, framing, peer gone).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Underlying I/O failed.
    #[error("io error: {0}")]
    Io(String),
    /// Peer closed the channel.
    #[error("channel closed")]
    Closed,
    /// Peer answered with something the protocol does not allow here.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// Packet could not be framed or decoded.
    #[error(transparent)]
    Codec(#[from] WireError),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            return TransportError::Closed;
        }
        TransportError::Io(err.to_string())
    }
}

/// Error surfaced by a host gateway operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The host does not recognize the referenced instance. Never retryable.
    #[error("unknown instance handle {0}")]
    UnknownHandle(WidgetId),
    /// No view is currently mounted on the host.
    #[error("no view is mounted")]
    NoView,
    /// The host refused the request for another reason.
    #[error("host rejected request: [{name}] {message}")]
    Rejected {
        /// Numeric error code.
        code: u32,
        /// Stable error identifier.
        name: String,
        /// Human readable detail.
        message: String,
    },
    /// The call never got an answer.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl GatewayError {
    /// Map a host error response onto the taxonomy.
    ///
    /// `subject` is the handle the failed request referenced, if any.
    pub fn from_payload(payload: ErrorPayload, subject: Option<WidgetId>) -> Self {
        match (payload.code, subject) {
            (E_UNKNOWN_HANDLE, Some(id)) => GatewayError::UnknownHandle(id),
            (E_NO_VIEW, _) => GatewayError::NoView,
            _ => GatewayError::Rejected {
                code: payload.code,
                name: payload.name,
                message: payload.message,
            },
        }
    }

    /// Whether a caller may reasonably try the same call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transport(TransportError::Io(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_bridge_proto::wire::E_BUSY;

    #[test]
    fn unknown_handle_payload_maps_to_subject() {
        let err = GatewayError::from_payload(ErrorPayload::new(E_UNKNOWN_HANDLE, "gone"), Some(12));
        assert_eq!(err, GatewayError::UnknownHandle(12));
        assert!(!err.is_retryable());
    }

    #[test]
    fn other_codes_stay_rejections() {
        let err = GatewayError::from_payload(ErrorPayload::new(E_BUSY, "poll outstanding"), None);
        assert!(matches!(err, GatewayError::Rejected { code: E_BUSY, .. }));
    }

    #[test]
    fn eof_reads_as_closed() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(TransportError::from(io), TransportError::Closed);
    }
}
