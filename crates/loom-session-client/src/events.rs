// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Async plugin event source over a Unix socket.

use std::path::Path;

use loom_bridge_proto::wire::{encode_message, Message};
use loom_bridge_proto::PluginEvent;
use loom_host_port::{EventSource, TransportError};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::{debug, trace};

use crate::frame::FrameReader;

/// Each poll sends one `next_plugin_event` and awaits exactly one reply.
///
/// Cancel-safe: a poll dropped before its reply leaves the request
/// outstanding, and the next poll waits for that reply instead of sending
/// another request.
#[derive(Debug)]
pub struct SocketEventSource {
    frames: FrameReader<UnixStream>,
    seq: u64,
    outstanding: Option<u64>,
    unsent: Vec<u8>,
}

impl SocketEventSource {
    /// Connect to the host at `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        Ok(Self::from_stream(UnixStream::connect(path).await?))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: UnixStream) -> Self {
        Self {
            frames: FrameReader::new(stream),
            seq: 0,
            outstanding: None,
            unsent: Vec::new(),
        }
    }

    /// Sequence number of a request still waiting for its reply.
    pub fn outstanding(&self) -> Option<u64> {
        self.outstanding
    }
}

impl EventSource for SocketEventSource {
    async fn next_plugin_event(&mut self) -> Result<PluginEvent, TransportError> {
        let expected = if let Some(seq) = self.outstanding {
            debug!(seq, "resuming abandoned poll");
            seq
        } else {
            self.seq += 1;
            self.unsent = encode_message(&Message::NextPluginEvent, self.seq)?;
            self.outstanding = Some(self.seq);
            self.seq
        };
        while !self.unsent.is_empty() {
            let n = self.frames.get_mut().write(&self.unsent).await?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            self.unsent.drain(..n);
        }

        let (reply, seq) = self.frames.next_frame().await?.ok_or(TransportError::Closed)?;
        self.outstanding = None;
        if seq != expected {
            return Err(TransportError::Protocol(format!(
                "next_plugin_event answered with seq {seq}, expected {expected}"
            )));
        }
        match reply {
            Message::PluginEvent(event) => {
                trace!(tag = event.tag(), "plugin event received");
                Ok(event)
            }
            Message::Error(err) => Err(TransportError::Protocol(format!("[{}] {}", err.name, err.message))),
            other => Err(TransportError::Protocol(format!(
                "next_plugin_event answered with {}",
                other.op_name()
            ))),
        }
    }
}
