// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Control connection for tools that drive a headless host.

use std::path::Path;

use anyhow::{anyhow, bail, Result};
use loom_bridge_proto::wire::{FireEventPayload, Message, OpenViewPayload};
use loom_bridge_proto::{Instance, ReconcilerMode, WidgetId};
use loom_host_port::TransportError;
use tokio::net::UnixStream;

use crate::frame::{read_frame, write_frame};

/// Minimal async control client.
pub struct ControlClient {
    stream: UnixStream,
    seq: u64,
}

impl ControlClient {
    /// Connect to the host at `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .map_err(|err| anyhow!("connect {}: {err}", path.display()))?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: UnixStream) -> Self {
        Self { stream, seq: 0 }
    }

    /// Mount a view; the host emits `ViewCreated`.
    pub async fn open_view(&mut self, reconciler_mode: ReconcilerMode, view_name: &str) -> Result<()> {
        let msg = Message::OpenView(OpenViewPayload {
            reconciler_mode,
            view_name: view_name.to_owned(),
        });
        self.expect_ok(&msg).await
    }

    /// Tear the view down; the host emits `ViewDestroyed`.
    pub async fn close_view(&mut self) -> Result<()> {
        self.expect_ok(&Message::CloseView).await
    }

    /// Simulate an interaction on `widget_id`.
    pub async fn fire_event(&mut self, widget_id: WidgetId, event_name: &str) -> Result<()> {
        let msg = Message::FireEvent(FireEventPayload {
            widget_id,
            event_name: event_name.to_owned(),
        });
        self.expect_ok(&msg).await
    }

    /// Ask the host to emit the stop command.
    pub async fn stop(&mut self) -> Result<()> {
        self.expect_ok(&Message::Stop).await
    }

    /// Current native tree, if a view is mounted.
    pub async fn dump_tree(&mut self) -> Result<Option<Instance>> {
        match self.request(&Message::DumpTree).await? {
            Message::Tree(root) => Ok(root),
            other => bail!("dump_tree answered with {}", other.op_name()),
        }
    }

    async fn expect_ok(&mut self, msg: &Message) -> Result<()> {
        match self.request(msg).await? {
            Message::Ok => Ok(()),
            other => bail!("{} answered with {}", msg.op_name(), other.op_name()),
        }
    }

    async fn request(&mut self, msg: &Message) -> Result<Message> {
        self.seq += 1;
        write_frame(&mut self.stream, msg, self.seq).await?;
        let (reply, seq) = read_frame(&mut self.stream)
            .await?
            .ok_or(TransportError::Closed)?;
        if seq != self.seq {
            bail!("{} answered with seq {seq}, expected {}", msg.op_name(), self.seq);
        }
        match reply {
            Message::Error(err) => Err(anyhow!("host rejected {}: [{}] {}", msg.op_name(), err.name, err.message)),
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_bridge_proto::wire::{ErrorPayload, E_UNKNOWN_HANDLE};
    use loom_bridge_proto::Properties;
    use tokio::task;

    #[tokio::test]
    async fn control_ops_send_one_frame_each() {
        let (client, mut server) = UnixStream::pair().unwrap();
        let tree = Instance::new(0x8000_0000, "container", Properties::new());
        let reply_tree = tree.clone();
        let host = task::spawn(async move {
            let mut seen = Vec::new();
            while let Some((req, seq)) = read_frame(&mut server).await.unwrap() {
                let reply = match &req {
                    Message::DumpTree => Message::Tree(Some(reply_tree.clone())),
                    Message::FireEvent(_) => Message::Error(ErrorPayload::new(E_UNKNOWN_HANDLE, "no widget 5")),
                    _ => Message::Ok,
                };
                seen.push(req.op_name());
                write_frame(&mut server, &reply, seq).await.unwrap();
            }
            seen
        });

        let mut control = ControlClient::from_stream(client);
        control.open_view(ReconcilerMode::Concurrent, "root").await.unwrap();
        assert_eq!(control.dump_tree().await.unwrap(), Some(tree));
        let err = control.fire_event(5, "onPress").await.unwrap_err();
        assert!(err.to_string().contains("E_UNKNOWN_HANDLE"));
        control.close_view().await.unwrap();
        control.stop().await.unwrap();
        drop(control);

        assert_eq!(
            host.await.unwrap(),
            vec!["open_view", "dump_tree", "fire_event", "close_view", "stop"]
        );
    }

    #[tokio::test]
    async fn stale_reply_is_rejected() {
        let (client, mut server) = UnixStream::pair().unwrap();
        let host = task::spawn(async move {
            let (_, seq) = read_frame(&mut server).await.unwrap().unwrap();
            write_frame(&mut server, &Message::Ok, seq + 7).await.unwrap();
        });

        let mut control = ControlClient::from_stream(client);
        let err = control.stop().await.unwrap_err();
        assert!(err.to_string().contains("seq 8, expected 1"), "{err}");
        host.await.unwrap();
    }
}
