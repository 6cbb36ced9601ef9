// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Single-flight access to a plugin event source.

use std::sync::Arc;

use loom_bridge_proto::PluginEvent;
use loom_host_port::EventSource;
use tokio::sync::Mutex;

use crate::BridgeError;

/// Shared handle that lets at most one `next_plugin_event` call be
/// outstanding at any time.
///
/// A caller that finds a poll in progress gets [`BridgeError::ConcurrentPoll`]
/// immediately; the source is never touched. Dropping a pending `poll()`
/// future releases the slot.
#[derive(Debug)]
pub struct SingleFlight<S> {
    source: Arc<Mutex<S>>,
}

impl<S> Clone for SingleFlight<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<S> SingleFlight<S> {
    /// Take ownership of `source`.
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
        }
    }

    /// Whether some caller is currently suspended in a poll.
    pub fn is_outstanding(&self) -> bool {
        self.source.try_lock().is_err()
    }

    /// Recover the source if this is the last handle.
    pub fn into_inner(self) -> Option<S> {
        Arc::try_unwrap(self.source).ok().map(Mutex::into_inner)
    }
}

impl<S: EventSource> SingleFlight<S> {
    /// Request the next plugin event.
    pub async fn poll(&self) -> Result<PluginEvent, BridgeError> {
        let mut source = self.source.try_lock().map_err(|_| BridgeError::ConcurrentPoll)?;
        Ok(source.next_plugin_event().await?)
    }
}
