// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Blocking `HostGateway` over a Unix socket.

use std::os::unix::net::UnixStream;
use std::path::Path;

use loom_bridge_proto::wire::{
    CallEventListenerPayload, CloneInstancePayload, LogPayload, Message, ReplaceChildrenPayload,
};
use loom_bridge_proto::{Instance, LogLevel, Properties, WidgetId};
use loom_host_port::{GatewayError, HostGateway, TransportError};
use tracing::warn;

use crate::frame::{read_frame_blocking, write_frame_blocking};

/// One request, one response, on a dedicated connection.
#[derive(Debug)]
pub struct SocketGateway {
    stream: UnixStream,
    seq: u64,
}

impl SocketGateway {
    /// Connect to the host at `path`.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        Ok(Self::from_stream(UnixStream::connect(path)?))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: UnixStream) -> Self {
        Self { stream, seq: 0 }
    }

    fn request(&mut self, msg: &Message, subject: Option<WidgetId>) -> Result<Message, GatewayError> {
        self.seq += 1;
        write_frame_blocking(&mut self.stream, msg, self.seq)?;
        let (reply, seq) = read_frame_blocking(&mut self.stream)?.ok_or(TransportError::Closed)?;
        if seq != self.seq {
            return Err(TransportError::Protocol(format!(
                "{} answered with seq {seq}, expected {}",
                msg.op_name(),
                self.seq
            ))
            .into());
        }
        match reply {
            Message::Error(payload) => Err(GatewayError::from_payload(payload, subject)),
            other => Ok(other),
        }
    }

    fn expect_ok(&mut self, msg: &Message, subject: Option<WidgetId>) -> Result<(), GatewayError> {
        match self.request(msg, subject)? {
            Message::Ok => Ok(()),
            other => Err(unexpected(msg, &other)),
        }
    }

    fn expect_instance(&mut self, msg: &Message, subject: Option<WidgetId>) -> Result<Instance, GatewayError> {
        match self.request(msg, subject)? {
            Message::Instance(instance) => Ok(instance),
            other => Err(unexpected(msg, &other)),
        }
    }
}

fn unexpected(request: &Message, reply: &Message) -> GatewayError {
    TransportError::Protocol(format!("{} answered with {}", request.op_name(), reply.op_name())).into()
}

impl HostGateway for SocketGateway {
    fn log(&mut self, level: LogLevel, target: &str, message: &str) {
        let msg = Message::Log(LogPayload {
            level,
            target: target.to_owned(),
            message: message.to_owned(),
        });
        if let Err(err) = self.expect_ok(&msg, None) {
            warn!(%err, "host log sink unavailable");
        }
    }

    fn call_event_listener(&mut self, instance: &Instance, event_name: &str) -> Result<(), GatewayError> {
        let msg = Message::CallEventListener(CallEventListenerPayload {
            widget_id: instance.widget_id,
            event_name: event_name.to_owned(),
        });
        self.expect_ok(&msg, Some(instance.widget_id))
    }

    fn clone_instance(
        &mut self,
        instance: &Instance,
        update_payload: &[String],
        widget_type: &str,
        old_props: &Properties,
        new_props: &Properties,
        keep_children: bool,
    ) -> Result<Instance, GatewayError> {
        let msg = Message::CloneInstance(CloneInstancePayload {
            widget_id: instance.widget_id,
            update_payload: update_payload.to_vec(),
            widget_type: widget_type.to_owned(),
            old_props: old_props.clone(),
            new_props: new_props.clone(),
            keep_children,
        });
        self.expect_instance(&msg, Some(instance.widget_id))
    }

    fn replace_container_children(&mut self, container: &Instance, new_children: &[Instance]) -> Result<(), GatewayError> {
        let msg = Message::ReplaceContainerChildren(ReplaceChildrenPayload {
            container_id: container.widget_id,
            children: new_children.to_vec(),
        });
        self.expect_ok(&msg, Some(container.widget_id))
    }

    fn get_container(&mut self) -> Result<Instance, GatewayError> {
        self.expect_instance(&Message::GetContainer, None)
    }
}
