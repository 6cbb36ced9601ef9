// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-process host for the renderer bridge.
//!
//! This crate provides:
//! - [`MemoryHost`], a headless native tree implementing `HostGateway`
//! - [`ScriptedEvents`], a replaying `EventSource` for loop tests
//!
//! The headless host service wraps `MemoryHost` behind a socket; tests use it
//! directly.

mod host;
mod scripted;

pub use host::{ClonePolicy, LogRecord, MemoryHost, CONTAINER_WIDGET_TYPE};
pub use loom_bridge_proto::HOST_ID_BASE;
pub use scripted::{ScriptedEvents, SourceStats};
