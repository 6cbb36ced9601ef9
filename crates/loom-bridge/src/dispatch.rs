// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Plugin event pump.
//!
//! One poll at a time: the loop awaits an event, routes it, and only then
//! polls again. `stop` ends the loop cleanly; a source failure ends it with an
//! error. Anything else that goes wrong while routing is logged and the event
//! is dropped.

use loom_bridge_proto::PluginEvent;
use loom_host_port::{EventSource, HostGateway};
use tracing::{debug, error, info, trace, warn};

use crate::{BridgeError, Reconciler, RendererBridge, SingleFlight};

/// Where the loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Ready to poll.
    Idle,
    /// A poll is outstanding.
    Awaiting,
    /// Routing the event just received.
    Dispatching,
    /// Terminal. No further polls are issued.
    Stopped,
}

/// Counters kept by [`EventDispatchLoop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Events received from the source.
    pub polls: u64,
    /// Events routed to the root lifecycle, the reconciler, or the stop command.
    pub dispatched: u64,
    /// Events logged and discarded.
    pub dropped: u64,
}

/// Drives a [`Reconciler`] from an [`EventSource`].
#[derive(Debug)]
pub struct EventDispatchLoop<S, G, R> {
    poller: SingleFlight<S>,
    bridge: RendererBridge<G>,
    reconciler: R,
    state: LoopState,
    stats: LoopStats,
}

impl<S, G, R> EventDispatchLoop<S, G, R>
where
    S: EventSource,
    G: HostGateway,
    R: Reconciler<G>,
{
    /// Assemble a loop with no mounted root.
    pub fn new(source: S, gateway: G, reconciler: R) -> Self {
        Self {
            poller: SingleFlight::new(source),
            bridge: RendererBridge::new(gateway),
            reconciler,
            state: LoopState::Idle,
            stats: LoopStats::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Counters so far.
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// The bridge the reconciler mutates.
    pub fn bridge(&self) -> &RendererBridge<G> {
        &self.bridge
    }

    /// Mutable access to the bridge.
    pub fn bridge_mut(&mut self) -> &mut RendererBridge<G> {
        &mut self.bridge
    }

    /// The embedded reconciler.
    pub fn reconciler(&self) -> &R {
        &self.reconciler
    }

    /// Another handle on the loop's single-flight poller.
    ///
    /// Polling through it while the loop is awaiting yields
    /// [`BridgeError::ConcurrentPoll`].
    pub fn poller(&self) -> SingleFlight<S> {
        self.poller.clone()
    }

    /// Poll one event and route it.
    ///
    /// Returns the state after routing. Once `Stopped`, further calls return
    /// immediately without polling.
    pub async fn step(&mut self) -> Result<LoopState, BridgeError> {
        if self.state == LoopState::Stopped {
            return Ok(LoopState::Stopped);
        }
        self.state = LoopState::Awaiting;
        let event = match self.poller.poll().await {
            Ok(event) => event,
            Err(BridgeError::ConcurrentPoll) => {
                self.state = LoopState::Idle;
                return Err(BridgeError::ConcurrentPoll);
            }
            Err(err) => {
                error!(%err, "event source failed; stopping");
                self.state = LoopState::Stopped;
                return Err(err);
            }
        };
        self.stats.polls += 1;
        self.state = LoopState::Dispatching;
        trace!(tag = event.tag(), "dispatching");
        self.route(event);
        if self.state == LoopState::Dispatching {
            self.state = LoopState::Idle;
        }
        Ok(self.state)
    }

    /// Step until stopped.
    pub async fn run(&mut self) -> Result<LoopStats, BridgeError> {
        info!("event loop started");
        while self.step().await? != LoopState::Stopped {}
        info!(
            polls = self.stats.polls,
            dispatched = self.stats.dispatched,
            dropped = self.stats.dropped,
            "event loop stopped"
        );
        Ok(self.stats)
    }

    fn route(&mut self, event: PluginEvent) {
        match event {
            PluginEvent::ViewEvent {
                event_name,
                widget,
                event_arguments,
            } => {
                if self.bridge.root().is_none() {
                    warn!(widget, %event_name, "view event with no mounted root; dropped");
                    self.stats.dropped += 1;
                    return;
                }
                if let Err(err) = self
                    .reconciler
                    .dispatch_event(&mut self.bridge, widget, &event_name, &event_arguments)
                {
                    error!(widget, %event_name, %err, "reconciler failed to handle view event");
                }
                self.stats.dispatched += 1;
            }
            PluginEvent::ViewCreated {
                reconciler_mode,
                view_name,
            } => {
                if let Err(err) = self.bridge.mount(reconciler_mode, &view_name) {
                    error!(%view_name, %err, "could not mount root; dropped");
                    self.stats.dropped += 1;
                    return;
                }
                if let Err(err) = self.reconciler.view_created(&mut self.bridge) {
                    error!(%view_name, %err, "reconciler failed to render new root");
                }
                self.stats.dispatched += 1;
            }
            PluginEvent::ViewDestroyed => {
                if self.bridge.unmount().is_some() {
                    self.reconciler.view_destroyed();
                    self.stats.dispatched += 1;
                } else {
                    warn!("view destroyed with no mounted root; dropped");
                    self.stats.dropped += 1;
                }
            }
            PluginEvent::PluginCommand { command_type } => {
                if command_type == loom_bridge_proto::STOP_COMMAND {
                    debug!("stop command received");
                    self.state = LoopState::Stopped;
                    self.stats.dispatched += 1;
                } else {
                    warn!(%command_type, "unknown plugin command; dropped");
                    self.stats.dropped += 1;
                }
            }
            PluginEvent::Unrecognized { tag, reason } => {
                error!(%tag, %reason, "unrecognized plugin event; dropped");
                self.stats.dropped += 1;
            }
        }
    }
}
