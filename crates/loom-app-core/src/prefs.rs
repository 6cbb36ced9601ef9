// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Saved preferences for the headless host.

use std::path::PathBuf;

use loom_bridge_proto::default_socket_path;
use serde::{Deserialize, Serialize};

/// Config key the host prefs are stored under.
pub const HOST_PREFS_KEY: &str = "host";

/// How the host treats identity when cloning an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneIdentity {
    /// The clone keeps the source's identity.
    #[default]
    InPlace,
    /// The clone gets a fresh host identity.
    Fresh,
}

/// Headless host settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostPrefs {
    /// Unix socket the host listens on.
    pub socket_path: PathBuf,
    /// Identity policy for `clone_instance`.
    pub clone_identity: CloneIdentity,
    /// Unpolled plugin events the host holds before it warns about the backlog.
    ///
    /// Producers never wait on the queue; gateway replies must not depend on
    /// the bridge polling.
    pub event_queue_capacity: usize,
}

impl Default for HostPrefs {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            clone_identity: CloneIdentity::InPlace,
            event_queue_capacity: 256,
        }
    }
}
