// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Headless Loom host.
//!
//! Serves the bridge gateway ops and the plugin event stream over a Unix
//! socket, backed by an in-memory native tree. Control ops let tools mount
//! views and simulate interactions.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use loom_app_core::config::ConfigService;
use loom_app_core::prefs::{CloneIdentity, HostPrefs, HOST_PREFS_KEY};
use loom_bridge_proto::wire::{ErrorPayload, Message, E_BAD_REQUEST, E_BUSY, E_INTERNAL, E_NO_VIEW, E_UNKNOWN_HANDLE};
use loom_bridge_proto::{Instance, PluginEvent, WidgetId};
use loom_config_fs::FsConfigStore;
use loom_host_memory::{ClonePolicy, MemoryHost};
use loom_host_port::{GatewayError, HostGateway, TransportError};
use loom_session_client::frame::{write_frame, FrameReader};
use tokio::io::AsyncRead;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, MutexGuard, Notify};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless Loom host")]
struct Args {
    /// Unix socket to listen on (overrides saved prefs)
    #[arg(long)]
    socket: Option<PathBuf>,
    /// Give clones a fresh host identity instead of updating in place
    #[arg(long)]
    fresh_identity: bool,
}

struct HostState {
    host: MemoryHost,
    queue: VecDeque<PluginEvent>,
    backlog_warning: usize,
    stopped: bool,
}

impl HostState {
    /// Queue an event unless the stop command already went out.
    ///
    /// Never waits: gateway replies must not depend on the poller draining.
    fn emit(&mut self, event: PluginEvent) {
        if self.stopped {
            warn!(tag = event.tag(), "event after stop; discarded");
            return;
        }
        if event.is_stop() {
            self.stopped = true;
        }
        debug!(tag = event.tag(), "event queued");
        self.queue.push_back(event);
        if self.queue.len() == self.backlog_warning + 1 {
            warn!(backlog = self.queue.len(), "plugin events are piling up; is the bridge polling?");
        }
    }
}

/// Everything connections share: the tree and the event queue.
struct Hub {
    state: Mutex<HostState>,
    ready: Notify,
    poll_slot: Mutex<()>,
}

impl Hub {
    fn new(host: MemoryHost, backlog_warning: usize) -> Self {
        Self {
            state: Mutex::new(HostState {
                host,
                queue: VecDeque::with_capacity(backlog_warning),
                backlog_warning,
                stopped: false,
            }),
            ready: Notify::new(),
            poll_slot: Mutex::new(()),
        }
    }

    /// Run `f` against the host state, then wake the poller.
    ///
    /// Host mutation and event queueing share one lock, so nothing can be
    /// queued behind a stop command.
    async fn update<T>(&self, f: impl FnOnce(&mut HostState) -> T) -> T {
        let out = f(&mut *self.state.lock().await);
        self.ready.notify_one();
        out
    }

    /// Claim the single plugin event poll, or `None` if one is outstanding.
    fn claim_poll(&self) -> Option<PollSlot<'_>> {
        let held = self.poll_slot.try_lock().ok()?;
        Some(PollSlot { hub: self, _held: held })
    }
}

/// Exclusive right to take events off the queue.
struct PollSlot<'a> {
    hub: &'a Hub,
    _held: MutexGuard<'a, ()>,
}

impl PollSlot<'_> {
    /// Wait for the next event. Cancel-safe: an event leaves the queue only
    /// when this returns it.
    async fn next_event(&self) -> PluginEvent {
        loop {
            let next = self.hub.state.lock().await.queue.pop_front();
            if let Some(event) = next {
                return event;
            }
            self.hub.ready.notified().await;
        }
    }

    /// Return an event that could not be delivered to the head of the queue.
    async fn put_back(&self, event: PluginEvent) {
        self.hub.state.lock().await.queue.push_front(event);
        self.hub.ready.notify_one();
    }
}

fn busy() -> Message {
    Message::Error(ErrorPayload::new(E_BUSY, "a plugin event poll is already outstanding"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Config (best-effort)
    let config: Option<ConfigService<FsConfigStore>> = FsConfigStore::new().map(ConfigService::new).ok();
    let prefs: HostPrefs = match &config {
        Some(cfg) => cfg.load_or_init(HOST_PREFS_KEY).unwrap_or_else(|err| {
            warn!(%err, "host prefs unreadable; using defaults");
            HostPrefs::default()
        }),
        None => HostPrefs::default(),
    };

    let socket_path = args.socket.unwrap_or_else(|| prefs.socket_path.clone());
    let policy = if args.fresh_identity || prefs.clone_identity == CloneIdentity::Fresh {
        ClonePolicy::FreshIdentity
    } else {
        ClonePolicy::InPlace
    };
    let hub = Arc::new(Hub::new(MemoryHost::new(policy), prefs.event_queue_capacity));

    // Remove stale socket if present
    let _ = std::fs::remove_file(&socket_path);
    let listener = UnixListener::bind(&socket_path)?;
    info!(socket = %socket_path.display(), ?policy, "loom host listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let hub = hub.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_client(stream, hub).await {
                        warn!(%err, "client handler error");
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

async fn handle_client(stream: UnixStream, hub: Arc<Hub>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut frames = FrameReader::new(reader);
    let mut pipelined = VecDeque::new();
    loop {
        let (msg, seq) = match pipelined.pop_front() {
            Some(request) => request,
            None => match frames.next_frame().await? {
                Some(request) => request,
                None => break,
            },
        };
        if matches!(msg, Message::NextPluginEvent) {
            let Some(slot) = hub.claim_poll() else {
                write_frame(&mut writer, &busy(), seq).await?;
                continue;
            };
            let Some(event) = wait_for_event(&slot, &mut frames, &mut pipelined).await? else {
                debug!(seq, "poller hung up; poll abandoned");
                break;
            };
            if let Err(err) = write_frame(&mut writer, &Message::PluginEvent(event.clone()), seq).await {
                warn!(tag = event.tag(), "event undeliverable; requeued");
                slot.put_back(event).await;
                return Err(err.into());
            }
            continue;
        }
        let op = msg.op_name();
        let reply = handle_message(msg, &hub).await;
        if let Message::Error(err) = &reply {
            debug!(op, code = err.code, message = %err.message, "request rejected");
        }
        write_frame(&mut writer, &reply, seq).await?;
    }
    Ok(())
}

/// Wait for an event while watching the poller's socket.
///
/// `None` when the poller hangs up first. Requests the poller sends while
/// waiting are kept in `pipelined` and answered after the event.
async fn wait_for_event<R: AsyncRead + Unpin>(
    slot: &PollSlot<'_>,
    frames: &mut FrameReader<R>,
    pipelined: &mut VecDeque<(Message, u64)>,
) -> Result<Option<PluginEvent>, TransportError> {
    loop {
        tokio::select! {
            event = slot.next_event() => return Ok(Some(event)),
            request = frames.next_frame() => match request? {
                Some(request) => pipelined.push_back(request),
                None => return Ok(None),
            },
        }
    }
}

/// Serve one request. Every request gets exactly one reply.
async fn handle_message(msg: Message, hub: &Hub) -> Message {
    match msg {
        Message::Log(p) => {
            hub.state.lock().await.host.log(p.level, &p.target, &p.message);
            Message::Ok
        }
        Message::CallEventListener(p) => hub
            .update(|state| {
                let instance = lookup(&state.host, p.widget_id)?;
                state.host.call_event_listener(&instance, &p.event_name)?;
                for event in state.host.drain_fired() {
                    state.emit(event);
                }
                Ok::<(), GatewayError>(())
            })
            .await
            .map_or_else(|err| error_reply(&err), |()| Message::Ok),
        Message::CloneInstance(p) => {
            let mut state = hub.state.lock().await;
            let result = lookup(&state.host, p.widget_id).and_then(|instance| {
                state.host.clone_instance(
                    &instance,
                    &p.update_payload,
                    &p.widget_type,
                    &p.old_props,
                    &p.new_props,
                    p.keep_children,
                )
            });
            result.map_or_else(|err| error_reply(&err), Message::Instance)
        }
        Message::ReplaceContainerChildren(p) => {
            let mut state = hub.state.lock().await;
            let result = lookup(&state.host, p.container_id)
                .and_then(|container| state.host.replace_container_children(&container, &p.children));
            result.map_or_else(|err| error_reply(&err), |()| Message::Ok)
        }
        Message::GetContainer => {
            let result = hub.state.lock().await.host.get_container();
            result.map_or_else(|err| error_reply(&err), Message::Instance)
        }
        Message::NextPluginEvent => match hub.claim_poll() {
            Some(slot) => Message::PluginEvent(slot.next_event().await),
            None => busy(),
        },
        Message::OpenView(p) => {
            hub.update(|state| {
                let event = state.host.open_view(p.reconciler_mode, &p.view_name);
                state.emit(event);
            })
            .await;
            Message::Ok
        }
        Message::CloseView => {
            hub.update(|state| {
                let event = state.host.close_view();
                state.emit(event);
            })
            .await;
            Message::Ok
        }
        Message::FireEvent(p) => hub
            .update(|state| {
                let event = state.host.fire(p.widget_id, &p.event_name)?;
                state.emit(event);
                Ok::<(), GatewayError>(())
            })
            .await
            .map_or_else(|err| error_reply(&err), |()| Message::Ok),
        Message::Stop => {
            hub.update(|state| state.emit(PluginEvent::stop())).await;
            Message::Ok
        }
        Message::DumpTree => Message::Tree(hub.state.lock().await.host.tree()),
        other @ (Message::Ok
        | Message::Instance(_)
        | Message::PluginEvent(_)
        | Message::Tree(_)
        | Message::Error(_)) => Message::Error(ErrorPayload::new(
            E_BAD_REQUEST,
            format!("{} is a response, not a request", other.op_name()),
        )),
    }
}

fn lookup(host: &MemoryHost, widget_id: WidgetId) -> Result<Instance, GatewayError> {
    host.instance(widget_id).ok_or(GatewayError::UnknownHandle(widget_id))
}

fn error_reply(err: &GatewayError) -> Message {
    let payload = match err {
        GatewayError::UnknownHandle(_) => ErrorPayload::new(E_UNKNOWN_HANDLE, err.to_string()),
        GatewayError::NoView => ErrorPayload::new(E_NO_VIEW, err.to_string()),
        GatewayError::Rejected { code, name, message } => ErrorPayload {
            code: *code,
            name: name.clone(),
            message: message.clone(),
        },
        GatewayError::Transport(_) => ErrorPayload::new(E_INTERNAL, err.to_string()),
    };
    Message::Error(payload)
}
