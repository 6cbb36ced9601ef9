// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Client side of the Loom host socket (CBOR-framed Unix sockets).
//!
//! Each half of the bridge gets its own connection so a suspended event poll
//! never blocks a gateway call:
//! - [`SocketGateway`]: blocking request/response `HostGateway`.
//! - [`SocketEventSource`]: async single-request `EventSource`.
//! - [`ControlClient`]: async helper for tooling that drives a headless host.

mod control;
mod events;
pub mod frame;
mod gateway;

pub use control::ControlClient;
pub use events::SocketEventSource;
pub use gateway::SocketGateway;
