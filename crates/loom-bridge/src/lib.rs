// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Renderer bridge core.
//!
//! Hosts a reconciliation engine's view of a native tree that lives in another
//! process. Commit mutations become host gateway calls; plugin events from the
//! host are pulled one at a time and routed back into the reconciler.
//!
//! - [`RootContext`] allocates identities for one mounted root.
//! - [`InstanceIndex`] remembers what the host last told us about each handle.
//! - [`MutationTranslator`] turns commit operations into clone/replace calls.
//! - [`EventDispatchLoop`] drives the single-flight event stream.

use loom_bridge_proto::WidgetId;
use loom_host_port::{GatewayError, TransportError};
use thiserror::Error;

mod bridge;
mod dispatch;
mod index;
mod poller;
mod root;
mod translator;

pub use bridge::{Reconciler, RendererBridge, RootState};
pub use dispatch::{EventDispatchLoop, LoopState, LoopStats};
pub use index::{InstanceIndex, InstanceMeta};
pub use poller::SingleFlight;
pub use root::RootContext;
pub use translator::MutationTranslator;

/// Errors raised by the bridge core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Identity requested from a root that no longer exists. Fatal.
    #[error("root context has been torn down")]
    RootTornDown,
    /// Root identity space ran out.
    #[error("root context exhausted its identity space")]
    IdsExhausted,
    /// A handle passed to the bridge was never produced by it.
    #[error("instance {0} was not produced by this bridge")]
    ForeignHandle(WidgetId),
    /// A child named by a commit hook is not under the given parent.
    #[error("instance {child} is not a child of {parent}")]
    MissingChild {
        /// Parent that was searched.
        parent: WidgetId,
        /// Child that was not found.
        child: WidgetId,
    },
    /// A second event poll was attempted while one was outstanding.
    #[error("a plugin event poll is already outstanding")]
    ConcurrentPoll,
    /// A host operation failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    /// The plugin event source failed. Fatal for the dispatch loop.
    #[error("event source failed: {0}")]
    Transport(#[from] TransportError),
    /// The embedded reconciler reported a failure.
    #[error("reconciler error: {0}")]
    Reconciler(String),
}
